// src/store/file.rs
//! Durable store backed by a directory of JSON files:
//!
//! - `weights.json`: full weight snapshot, rewritten on each save
//! - `feedback.jsonl`, `adjustments.jsonl`, `metrics.jsonl`: append-only logs
//!
//! Unparseable lines are skipped with a warning instead of failing the read.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};

use super::{matches_window, PersistentStore};
use crate::adjustment::Adjustment;
use crate::feedback::Feedback;
use crate::metrics::Metrics;
use crate::weights::Weight;

const WEIGHTS_FILE: &str = "weights.json";
const FEEDBACK_FILE: &str = "feedback.jsonl";
const ADJUSTMENTS_FILE: &str = "adjustments.jsonl";
const METRICS_FILE: &str = "metrics.jsonl";

#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    // serialises read-modify-write of weights.json and appends
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating store dir {}", self.dir.display()))
    }

    async fn append_line<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        let _g = self.write_lock.lock().await;
        self.ensure_dir().await?;
        let path = self.path(name);
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        f.write_all(&line).await?;
        f.flush().await?;
        Ok(())
    }

    async fn read_lines<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let path = self.path(name);
        let content = match fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let mut out = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(v) => out.push(v),
                Err(e) => tracing::warn!(
                    target: "store",
                    file = name,
                    line = i + 1,
                    error = %e,
                    "skipping unparseable record"
                ),
            }
        }
        Ok(out)
    }

    async fn read_weights(&self) -> Result<Vec<Weight>> {
        let path = self.path(WEIGHTS_FILE);
        match fs::read_to_string(&path).await {
            Ok(s) if s.trim().is_empty() => Ok(Vec::new()),
            Ok(s) => serde_json::from_str(&s)
                .with_context(|| format!("parsing {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
}

#[async_trait::async_trait]
impl PersistentStore for JsonFileStore {
    async fn load_weights(&self) -> Result<Vec<Weight>> {
        self.read_weights().await
    }

    async fn save_weight(&self, weight: &Weight) -> Result<()> {
        let _g = self.write_lock.lock().await;
        self.ensure_dir().await?;
        let mut all = self.read_weights().await?;
        match all.iter_mut().find(|w| w.factor == weight.factor) {
            Some(existing) => *existing = weight.clone(),
            None => all.push(weight.clone()),
        }
        // write to a temp file then rename so a crash never leaves half a snapshot
        let tmp = self.path("weights.json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&all)?).await?;
        fs::rename(&tmp, self.path(WEIGHTS_FILE)).await?;
        Ok(())
    }

    async fn load_recent_feedback(&self, limit: usize) -> Result<Vec<Feedback>> {
        let all: Vec<Feedback> = self.read_lines(FEEDBACK_FILE).await?;
        let start = all.len().saturating_sub(limit);
        Ok(all[start..].to_vec())
    }

    async fn save_feedback(&self, feedback: &Feedback) -> Result<()> {
        self.append_line(FEEDBACK_FILE, feedback).await
    }

    async fn query_feedback(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> Result<Vec<Feedback>> {
        let all: Vec<Feedback> = self.read_lines(FEEDBACK_FILE).await?;
        let mut out: Vec<Feedback> = all
            .into_iter()
            .filter(|f| matches_window(f, start, end, user_id))
            .collect();
        out.sort_by_key(|f| f.timestamp());
        Ok(out)
    }

    async fn save_adjustment(&self, adjustment: &Adjustment) -> Result<()> {
        self.append_line(ADJUSTMENTS_FILE, adjustment).await
    }

    async fn save_metrics(&self, metrics: &Metrics) -> Result<()> {
        self.append_line(METRICS_FILE, metrics).await
    }
}
