use crate::deploy::{DeployProgress, DeployStep, HatchAddresses, ProgressListener};
use crate::ui::icons::{BLOCK, CHECK, COINS, CROSS, DAO, SEND, SPARKLE};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Terminal UI for a deployment run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Step bar: tracks the four stages (three transactions plus address collection)
/// - Wait bar: spinner showing what the run is currently waiting on
pub struct DeployUI {
    multi: MultiProgress,
    step_bar: ProgressBar,
    wait_bar: ProgressBar,
    verbose: bool,
}

impl DeployUI {
    pub fn new(verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let step_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░");
        let step_bar = multi.add(ProgressBar::new(DeployStep::Done.ordinal()));
        step_bar.set_style(step_style);
        step_bar.set_prefix(" Steps");

        let wait_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let wait_bar = multi.add(ProgressBar::new_spinner());
        wait_bar.set_style(wait_style);
        wait_bar.set_prefix("  Wait");

        Self {
            multi,
            step_bar,
            wait_bar,
            verbose,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` when the bars are hidden
    /// (stderr is not a terminal) or the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.is_hidden() || self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    fn start_step(&self, step: DeployStep) {
        self.step_bar.set_message(format!(
            "{}: {}",
            style(step).yellow(),
            step.description()
        ));
        self.wait_bar.set_message(match step {
            DeployStep::Done => "reading proxy events".to_string(),
            _ => "submitting transaction".to_string(),
        });
        self.wait_bar.enable_steady_tick(Duration::from_millis(100));
    }

    fn tx_submitted(&self, step: DeployStep, tx_hash: &str) {
        self.wait_bar
            .set_message(format!("{} waiting for confirmation", step));
        if self.verbose {
            self.print_line(format!(
                "    {} {} {}",
                SEND,
                step,
                style(tx_hash).dim()
            ));
        }
    }

    fn tx_confirmed(&self, step: DeployStep, block_number: u64) {
        self.step_bar.inc(1);
        self.print_line(format!(
            "{} {} confirmed {} block {}",
            CHECK,
            style(step).green().bold(),
            BLOCK,
            block_number
        ));
        if step == DeployStep::TxOne {
            self.wait_bar.set_message("waiting for DeployDao event");
        }
    }

    fn finished(&self, addresses: &HatchAddresses) {
        self.step_bar.inc(1);
        self.step_bar.finish_with_message("done");
        self.wait_bar.finish_and_clear();
        self.print_line(format!(
            "\n{} Hatch deployed at {}\n",
            SPARKLE,
            style(format!("{:?}", addresses.dao)).green().bold()
        ));
    }

    fn failed(&self, step: DeployStep, error: &str) {
        self.wait_bar.abandon_with_message(format!("{} stopped", step));
        self.step_bar.abandon();
        self.print_line(format!(
            "\n{} {} failed: {}\n",
            CROSS,
            style(step).red().bold(),
            error
        ));
    }
}

impl ProgressListener for DeployUI {
    fn on_progress(&self, event: &DeployProgress) {
        match event {
            DeployProgress::Started { run_id, dao_id } => self.print_line(format!(
                "Deploying run {} as {}",
                style(run_id).cyan(),
                style(dao_id).cyan()
            )),
            DeployProgress::StepStarted { step } => self.start_step(*step),
            DeployProgress::TxSubmitted { step, tx_hash } => {
                self.tx_submitted(*step, &format!("{:?}", tx_hash))
            }
            DeployProgress::TxConfirmed { step, receipt } => {
                self.tx_confirmed(*step, receipt.block_number)
            }
            DeployProgress::DaoDeployed { dao } => self.print_line(format!(
                "    {} organization {}",
                DAO,
                style(format!("{:?}", dao)).cyan()
            )),
            DeployProgress::ExpectedRaise {
                total_supply,
                expected_raise,
            } => self.print_line(format!(
                "    {} expected raise {} (total supply {})",
                COINS,
                style(expected_raise).cyan(),
                total_supply
            )),
            DeployProgress::Finished { addresses } => self.finished(addresses),
            DeployProgress::Failed { step, error } => self.failed(*step, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Receipt;
    use ethers::types::{Address, H256};

    #[test]
    fn test_step_bar_tracks_confirmations() {
        let ui = DeployUI::new(false);
        assert_eq!(ui.step_bar.length(), Some(4));
        ui.on_progress(&DeployProgress::StepStarted {
            step: DeployStep::TxOne,
        });
        ui.on_progress(&DeployProgress::TxConfirmed {
            step: DeployStep::TxOne,
            receipt: Receipt {
                tx_hash: H256::zero(),
                block_number: 1,
            },
        });
        assert_eq!(ui.step_bar.position(), 1);
    }

    #[test]
    fn test_failure_abandons_bars() {
        let ui = DeployUI::new(true);
        ui.on_progress(&DeployProgress::DaoDeployed {
            dao: Address::repeat_byte(1),
        });
        ui.on_progress(&DeployProgress::Failed {
            step: DeployStep::TxTwo,
            error: "reverted".to_string(),
        });
        assert!(ui.wait_bar.is_finished());
    }
}
