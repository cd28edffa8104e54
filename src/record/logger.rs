use super::{DeploymentRecord, RunStatus};
use crate::deploy::{DeployProgress, ProgressListener};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Persists the running deployment to `current-run.json` and archives it when done.
pub struct RecordLogger {
    record_dir: PathBuf,
    current: Option<DeploymentRecord>,
    current_file: PathBuf,
}

impl RecordLogger {
    pub fn new(record_dir: &Path) -> Self {
        Self {
            record_dir: record_dir.to_path_buf(),
            current: None,
            current_file: record_dir.join("current-run.json"),
        }
    }

    pub fn start_run(&mut self, record: DeploymentRecord) -> Result<()> {
        fs::create_dir_all(&self.record_dir).with_context(|| {
            format!(
                "Failed to create deployments directory: {}",
                self.record_dir.display()
            )
        })?;
        self.current = Some(record);
        self.save_current()
    }

    /// Apply a progress notification to the active record and persist it.
    pub fn apply(&mut self, event: &DeployProgress) -> Result<()> {
        let record = self
            .current
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("apply called with no active run"))?;
        record.apply(event);
        self.save_current()
    }

    /// Move a completed run to `<timestamp>_<run-id>.json`.
    pub fn finish_run(&mut self) -> Result<PathBuf> {
        let record = self
            .current
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No current run to finish"))?;
        if record.status != RunStatus::Completed {
            anyhow::bail!("Run {} has not completed", record.run_id);
        }

        let filename = format!(
            "{}_{}.json",
            record.started_at.format("%Y-%m-%dT%H-%M-%S"),
            record.run_id
        );
        let run_file = self.record_dir.join(&filename);

        let json =
            serde_json::to_string_pretty(record).context("Failed to serialize deployment record")?;
        fs::write(&run_file, json).context("Failed to write deployment record")?;

        if self.current_file.exists() {
            fs::remove_file(&self.current_file)
                .context("Failed to remove current-run.json after finishing run")?;
        }

        self.current = None;
        Ok(run_file)
    }

    pub fn save_current(&self) -> Result<()> {
        if let Some(ref record) = self.current {
            let json = serde_json::to_string_pretty(record)
                .context("Failed to serialize current run")?;
            fs::write(&self.current_file, json).context("Failed to write current run file")?;
        }
        Ok(())
    }

    pub fn load_current(&mut self) -> Result<bool> {
        if self.current_file.exists() {
            let content = fs::read_to_string(&self.current_file)
                .context("Failed to read current run file")?;
            let record: DeploymentRecord =
                serde_json::from_str(&content).context("Failed to parse current run file")?;
            self.current = Some(record);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn current(&self) -> Option<&DeploymentRecord> {
        self.current.as_ref()
    }

    /// Archived runs, most recent first.
    pub fn list_runs(&self) -> Result<Vec<PathBuf>> {
        if !self.record_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs: Vec<PathBuf> = fs::read_dir(&self.record_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .filter(|p| p != &self.current_file)
            .collect();

        runs.sort();
        runs.reverse();
        Ok(runs)
    }
}

/// Feeds orchestrator progress into a [`RecordLogger`], archiving the record on success.
pub struct RecordListener {
    inner: Mutex<ListenerState>,
}

struct ListenerState {
    logger: RecordLogger,
    archived: Option<PathBuf>,
}

impl RecordListener {
    pub fn new(logger: RecordLogger) -> Self {
        Self {
            inner: Mutex::new(ListenerState {
                logger,
                archived: None,
            }),
        }
    }

    /// Path of the archived record once the run finished.
    pub fn archived(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .ok()
            .and_then(|state| state.archived.clone())
    }
}

impl ProgressListener for RecordListener {
    fn on_progress(&self, event: &DeployProgress) {
        let Ok(mut state) = self.inner.lock() else {
            return;
        };
        if let Err(e) = state.logger.apply(event) {
            warn!(error = %e, "failed to update deployment record");
            return;
        }
        if matches!(event, DeployProgress::Finished { .. }) {
            match state.logger.finish_run() {
                Ok(path) => state.archived = Some(path),
                Err(e) => warn!(error = %e, "failed to archive deployment record"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryChain;
    use crate::deploy::{DeployStep, DeployTimeouts, HatchDeployer, RunId};
    use crate::params::{NetworkTokens, ParameterProvider, ParamsOverrides, StandardParameters};
    use ethers::types::{Address, U256};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn tokens() -> NetworkTokens {
        NetworkTokens {
            collateral_token: Address::repeat_byte(0xc0),
            contribution_token: Address::repeat_byte(0xc1),
            score_token: Address::repeat_byte(0xc2),
        }
    }

    fn make_record(run: &str) -> DeploymentRecord {
        let params = StandardParameters::new(tokens(), ParamsOverrides::default())
            .resolve(15)
            .unwrap();
        DeploymentRecord::new(
            RunId::parse(run).unwrap(),
            "simulated",
            format!("hatch-{}", run),
            params,
        )
    }

    fn setup_logger() -> (RecordLogger, TempDir) {
        let dir = TempDir::new().expect("failed to create temp dir");
        let logger = RecordLogger::new(&dir.path().join("simulated"));
        (logger, dir)
    }

    #[test]
    fn test_apply_without_active_run_returns_err() {
        let (mut logger, _dir) = setup_logger();
        let result = logger.apply(&DeployProgress::StepStarted {
            step: DeployStep::TxOne,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_start_run_creates_current_run_file() {
        let (mut logger, dir) = setup_logger();
        logger.start_run(make_record("a1")).unwrap();
        assert!(dir.path().join("simulated/current-run.json").exists());
    }

    #[test]
    fn test_unfinished_run_cannot_be_archived() {
        let (mut logger, _dir) = setup_logger();
        logger.start_run(make_record("a2")).unwrap();
        assert!(logger.finish_run().is_err());
        assert!(logger.current().is_some());
    }

    #[test]
    fn test_progress_is_persisted_to_disk() {
        let (mut logger, dir) = setup_logger();
        logger.start_run(make_record("a3")).unwrap();
        logger
            .apply(&DeployProgress::DaoDeployed {
                dao: Address::repeat_byte(0xda),
            })
            .unwrap();

        let mut second = RecordLogger::new(&dir.path().join("simulated"));
        assert!(second.load_current().unwrap());
        assert_eq!(
            second.current().unwrap().dao,
            Some(Address::repeat_byte(0xda))
        );
    }

    #[tokio::test]
    async fn test_successful_run_is_archived() {
        let (mut logger, dir) = setup_logger();
        logger.start_run(make_record("ok")).unwrap();
        let listener = Arc::new(RecordListener::new(logger));

        let chain = InMemoryChain::new()
            .with_token_supply(tokens().contribution_token, U256::exp10(21));
        let params = StandardParameters::new(tokens(), ParamsOverrides::default())
            .resolve(15)
            .unwrap();
        let mut deployer = HatchDeployer::new(
            Arc::new(chain),
            params,
            RunId::parse("ok").unwrap(),
            DeployTimeouts::default(),
        )
        .unwrap()
        .with_listener(listener.clone());
        let outcome = deployer.run().await.unwrap();

        let archived = listener.archived().expect("record archived");
        assert!(archived.file_name().unwrap().to_string_lossy().ends_with("_ok.json"));
        assert!(!dir.path().join("simulated/current-run.json").exists());

        let record: DeploymentRecord =
            serde_json::from_str(&std::fs::read_to_string(&archived).unwrap()).unwrap();
        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(record.transactions.len(), 3);
        assert!(record.transactions.iter().all(|tx| tx.block_number.is_some()));
        assert_eq!(record.addresses, Some(outcome.addresses));

        let runs = RecordLogger::new(&dir.path().join("simulated"))
            .list_runs()
            .unwrap();
        assert_eq!(runs, vec![archived]);
    }

    #[tokio::test]
    async fn test_failed_run_stays_current_with_error() {
        let (mut logger, dir) = setup_logger();
        logger.start_run(make_record("bad")).unwrap();
        let listener = Arc::new(RecordListener::new(logger));

        let chain = InMemoryChain::new()
            .with_token_supply(tokens().contribution_token, U256::exp10(21))
            .reverting_at(DeployStep::TxTwo);
        let params = StandardParameters::new(tokens(), ParamsOverrides::default())
            .resolve(15)
            .unwrap();
        let mut deployer = HatchDeployer::new(
            Arc::new(chain),
            params,
            RunId::parse("bad").unwrap(),
            DeployTimeouts::default(),
        )
        .unwrap()
        .with_listener(listener.clone());
        assert!(deployer.run().await.is_err());

        assert!(listener.archived().is_none());
        let mut reader = RecordLogger::new(&dir.path().join("simulated"));
        assert!(reader.load_current().unwrap());
        let record = reader.current().unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.step, DeployStep::TxTwo);
        assert!(record.dao.is_some());
        assert!(record.error.as_deref().unwrap().contains("tx two failed"));
    }
}
