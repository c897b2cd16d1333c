//! Training off the caller's thread

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::error;

use crate::error::{Error, Result};
use crate::model::Model;
use crate::sample::SampleSet;
use crate::training::{Progress, TrainingPlan, TrainingReport};

/// A training run on its own thread.
///
/// The model moves into the worker and comes back from [`TrainingHandle::join`].
pub struct TrainingHandle {
    cancel: Arc<AtomicBool>,
    worker: JoinHandle<Result<(Model, TrainingReport)>>,
}

/// Starts `model.train_on_dataset` on a new thread.
///
/// `on_progress` is called from the worker thread. An invalid plan is
/// rejected before the thread starts.
pub fn spawn_training<F>(mut model: Model, samples: SampleSet, plan: TrainingPlan, on_progress: F) -> Result<TrainingHandle>
where
    F: FnMut(Progress) + Send + 'static,
{
    plan.validate()?;
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);

    let worker = thread::Builder::new()
        .name("glyphnet-training".into())
        .spawn(move || {
            let report = model.train_on_dataset_until(&samples, &plan, &flag, on_progress)?;
            Ok((model, report))
        })
        .map_err(|e| Error::TrainingFailed(format!("could not start training thread: {e}")))?;

    Ok(TrainingHandle { cancel, worker })
}

impl TrainingHandle {
    /// Asks the run to stop before its next batch
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// True once the worker has returned, successfully or not
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Waits for the run. A panic on the worker becomes [`Error::TrainingFailed`].
    pub fn join(self) -> Result<(Model, TrainingReport)> {
        match self.worker.join() {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(%message, "Training thread panicked");
                Err(Error::TrainingFailed(message))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
