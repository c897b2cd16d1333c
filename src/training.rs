//! Bookkeeping for one full-dataset training run

use crate::error::{Error, Result};
use crate::hyperparameters::Hyperparameters;
use crate::optimizer::LearningRateSchedule;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long and how hard to train on a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingPlan {
    pub epochs: usize,
    /// Validation error below which a run at target accuracy may stop
    pub acceptable_error: f32,
    /// Spread per-sample work of each batch over the rayon pool
    pub parallel: bool,
}

impl Default for TrainingPlan {
    fn default() -> Self {
        TrainingPlan {
            epochs: 100,
            acceptable_error: 0.05,
            parallel: false,
        }
    }
}

impl TrainingPlan {
    pub fn new(epochs: usize, acceptable_error: f32, parallel: bool) -> Self {
        Self {
            epochs,
            acceptable_error,
            parallel,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be positive".into()));
        }
        if !(self.acceptable_error >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "acceptable_error must be a non-negative number, got {}",
                self.acceptable_error
            )));
        }
        Ok(())
    }
}

/// Progress notification sent after every epoch and once at the end.
///
/// The callback runs on whichever thread drives training.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Completed share of the epoch budget, 1.0 on the final notification
    pub fraction: f32,
    /// Validation error of the epoch, best validation error on the final notification
    pub error: f32,
    pub elapsed: Duration,
}

/// Why a training run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    EpochsExhausted,
    EarlyStopped,
    TargetReached,
    Cancelled,
    /// Validation error became NaN or infinite
    Diverged,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionState {
    Idle,
    Running { epoch: usize },
    Finished(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    pub epoch: usize,
    pub train_error: f32,
    pub train_accuracy: f32,
    pub validation_error: f32,
    pub validation_accuracy: f32,
    /// Rate in effect at the end of the epoch
    pub learning_rate: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Lowest validation error over all completed epochs.
    ///
    /// Infinite when the run was cancelled before its first epoch.
    pub best_validation_error: f32,
    pub epochs_completed: usize,
    pub stop_reason: StopReason,
    pub final_learning_rate: f32,
    /// Accuracy over the whole dataset after training
    pub final_accuracy: f32,
    pub history: Vec<EpochStats>,
}

/// Per-run state: learning rate schedule, best errors and the epoch counter.
///
/// Lives only for one call to `Model::train_on_dataset`.
#[derive(Debug)]
pub struct TrainingSession {
    state: SessionState,
    schedule: LearningRateSchedule,
    best_observed: f32,
    epochs: usize,
    acceptable_error: f32,
    early_stopping_patience: usize,
    target_accuracy: f32,
    history: Vec<EpochStats>,
}

impl TrainingSession {
    pub fn new(hp: &Hyperparameters, plan: &TrainingPlan) -> Self {
        TrainingSession {
            state: SessionState::Idle,
            schedule: LearningRateSchedule::new(hp),
            best_observed: f32::INFINITY,
            epochs: plan.epochs,
            acceptable_error: plan.acceptable_error,
            early_stopping_patience: hp.early_stopping_patience,
            target_accuracy: hp.target_accuracy,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn learning_rate(&self) -> f32 {
        self.schedule.rate()
    }

    pub fn epochs_completed(&self) -> usize {
        self.history.len()
    }

    pub fn best_validation_error(&self) -> f32 {
        self.best_observed
    }

    /// Moves to `Running` at the start of an epoch.
    ///
    /// Returns `Some` when the epoch budget is already spent.
    pub fn begin_epoch(&mut self) -> Option<StopReason> {
        match self.state {
            SessionState::Finished(reason) => Some(reason),
            _ if self.history.len() >= self.epochs => self.finish(StopReason::EpochsExhausted),
            _ => {
                self.state = SessionState::Running {
                    epoch: self.history.len(),
                };
                None
            }
        }
    }

    /// Records a completed epoch, adapts the learning rate and decides
    /// whether to stop.
    pub fn end_epoch(
        &mut self,
        train_error: f32,
        train_accuracy: f32,
        validation_error: f32,
        validation_accuracy: f32,
    ) -> Option<StopReason> {
        let epoch = self.history.len();

        if validation_error.is_finite() {
            self.best_observed = self.best_observed.min(validation_error);
            self.schedule.observe(validation_error);
        }

        self.history.push(EpochStats {
            epoch,
            train_error,
            train_accuracy,
            validation_error,
            validation_accuracy,
            learning_rate: self.schedule.rate(),
        });

        if !validation_error.is_finite() {
            return self.finish(StopReason::Diverged);
        }
        if self.schedule.stale_epochs() >= self.early_stopping_patience {
            return self.finish(StopReason::EarlyStopped);
        }
        if validation_accuracy >= self.target_accuracy && validation_error < self.acceptable_error {
            return self.finish(StopReason::TargetReached);
        }

        self.schedule.decay();
        if self.history.len() >= self.epochs {
            return self.finish(StopReason::EpochsExhausted);
        }
        None
    }

    pub fn cancel(&mut self) -> Option<StopReason> {
        self.finish(StopReason::Cancelled)
    }

    fn finish(&mut self, reason: StopReason) -> Option<StopReason> {
        self.state = SessionState::Finished(reason);
        Some(reason)
    }

    /// Closes the session; state returns to `Idle`.
    pub fn into_report(mut self, final_accuracy: f32) -> TrainingReport {
        let stop_reason = match self.state {
            SessionState::Finished(reason) => reason,
            _ => StopReason::EpochsExhausted,
        };
        self.state = SessionState::Idle;

        TrainingReport {
            best_validation_error: self.best_observed,
            epochs_completed: self.history.len(),
            stop_reason,
            final_learning_rate: self.schedule.rate(),
            final_accuracy,
            history: self.history,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_validation() {
        assert!(TrainingPlan::default().validate().is_ok());
        assert!(TrainingPlan::new(1, f32::INFINITY, true).validate().is_ok());
        assert!(matches!(
            TrainingPlan::new(0, 0.05, false).validate(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            TrainingPlan::new(10, -0.1, false).validate(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            TrainingPlan::new(10, f32::NAN, false).validate(),
            Err(Error::InvalidConfig(_))
        ));
    }

    fn session(hp: Hyperparameters, epochs: usize) -> TrainingSession {
        TrainingSession::new(&hp, &TrainingPlan::new(epochs, 0.05, false))
    }

    #[test]
    fn test_state_transitions() {
        let mut s = session(Hyperparameters::default(), 2);
        assert_eq!(s.state(), SessionState::Idle);

        assert_eq!(s.begin_epoch(), None);
        assert_eq!(s.state(), SessionState::Running { epoch: 0 });
        assert_eq!(s.end_epoch(1.0, 0.5, 1.0, 0.5), None);

        assert_eq!(s.begin_epoch(), None);
        assert_eq!(s.state(), SessionState::Running { epoch: 1 });
        assert_eq!(s.end_epoch(0.9, 0.6, 0.8, 0.6), Some(StopReason::EpochsExhausted));
        assert_eq!(s.state(), SessionState::Finished(StopReason::EpochsExhausted));

        // No way back into Running
        assert_eq!(s.begin_epoch(), Some(StopReason::EpochsExhausted));

        let report = s.into_report(0.6);
        assert_eq!(report.epochs_completed, 2);
        assert_eq!(report.best_validation_error, 0.8);
    }

    #[test]
    fn test_early_stopping_after_patience() {
        let hp = Hyperparameters {
            early_stopping_patience: 3,
            ..Default::default()
        };
        let mut s = session(hp, 100);
        let mut reason = None;
        while reason.is_none() {
            s.begin_epoch();
            reason = s.end_epoch(0.5, 0.5, 0.5, 0.5);
        }

        assert_eq!(reason, Some(StopReason::EarlyStopped));
        assert_eq!(s.epochs_completed(), 4);
    }

    #[test]
    fn test_target_reached_needs_low_error() {
        let mut s = session(Hyperparameters::default(), 100);
        s.begin_epoch();
        assert_eq!(s.end_epoch(0.1, 1.0, 0.2, 1.0), None);
        s.begin_epoch();
        assert_eq!(s.end_epoch(0.01, 1.0, 0.01, 0.96), Some(StopReason::TargetReached));
    }

    #[test]
    fn test_divergence_stops_training() {
        let mut s = session(Hyperparameters::default(), 100);
        s.begin_epoch();
        s.end_epoch(1.0, 0.1, 2.0, 0.1);
        s.begin_epoch();
        assert_eq!(s.end_epoch(f32::NAN, 0.1, f32::NAN, 0.1), Some(StopReason::Diverged));
        assert_eq!(s.best_validation_error(), 2.0);
    }

    #[test]
    fn test_best_error_is_minimum_not_last() {
        let mut s = session(Hyperparameters::default(), 3);
        for error in [0.4, 0.1, 0.3] {
            s.begin_epoch();
            s.end_epoch(error, 0.5, error, 0.5);
        }
        let report = s.into_report(0.5);
        assert_eq!(report.best_validation_error, 0.1);
        assert_eq!(report.history.len(), 3);
        assert_eq!(report.stop_reason, StopReason::EpochsExhausted);
    }
}
