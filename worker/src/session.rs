use std::{collections::HashMap, sync::Arc};

use machine_learning::{MlErr, TrainedModel};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The state of one `modelId`.
#[derive(Debug, Default)]
struct Session {
    generation: u64,
    cancel: CancellationToken,
    run: Option<JoinHandle<()>>,
    model: Option<Arc<TrainedModel>>,
}

/// Identifies one training run of a session.
#[derive(Debug, Clone)]
pub struct RunTicket {
    pub model_id: String,
    pub generation: u64,
    pub cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct Registry {
    sessions: HashMap<String, Session>,
    /// Runs of removed sessions that may not have ended yet.
    draining: HashMap<String, JoinHandle<()>>,
    /// Generations are unique per connection, never per session.
    generation: u64,
}

/// Every live session of a connection, keyed by `modelId`.
///
/// The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct Sessions {
    inner: Mutex<Registry>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.inner.lock().sessions.contains_key(model_id)
    }

    /// Starts a new run for `model_id`, cancelling the one in flight if any.
    ///
    /// The previous model stays available for predictions until the new run ends.
    ///
    /// # Arguments
    /// * `model_id` - The session to train.
    /// * `spawn` - Spawns the run given its ticket and the handle of the previous run, which
    ///   it must await before publishing anything. The previous run is either the one being
    ///   replaced or the one of a removed session with the same id.
    pub fn start_run<F>(&self, model_id: &str, spawn: F)
    where
        F: FnOnce(RunTicket, Option<JoinHandle<()>>) -> JoinHandle<()>,
    {
        let mut registry = self.inner.lock();
        let Registry {
            sessions,
            draining,
            generation,
        } = &mut *registry;

        *generation += 1;
        let session = sessions.entry(model_id.to_string()).or_default();

        session.cancel.cancel();
        session.cancel = CancellationToken::new();
        session.generation = *generation;

        let ticket = RunTicket {
            model_id: model_id.to_string(),
            generation: session.generation,
            cancel: session.cancel.clone(),
        };
        let previous = session.run.take().or_else(|| draining.remove(model_id));
        session.run = Some(spawn(ticket, previous));
    }

    /// Stores the model a run produced, unless the session was removed or restarted since.
    ///
    /// # Returns
    /// Whether the model was stored.
    pub fn complete_run(&self, ticket: &RunTicket, model: TrainedModel) -> bool {
        let mut registry = self.inner.lock();
        match registry.sessions.get_mut(&ticket.model_id) {
            Some(session) if session.generation == ticket.generation => {
                session.model = Some(Arc::new(model));
                true
            }
            _ => false,
        }
    }

    /// Registers a ready model, e.g. a pretrained one, replacing the session's model.
    pub fn insert_model(&self, model_id: &str, model: TrainedModel) {
        let mut registry = self.inner.lock();
        let session = registry.sessions.entry(model_id.to_string()).or_default();
        session.model = Some(Arc::new(model));
    }

    /// The trained model of `model_id`.
    ///
    /// # Returns
    /// The model or `SessionNotFound` if it never finished training or was removed.
    pub fn model(&self, model_id: &str) -> Result<Arc<TrainedModel>, MlErr> {
        self.inner
            .lock()
            .sessions
            .get(model_id)
            .and_then(|s| s.model.clone())
            .ok_or_else(|| MlErr::SessionNotFound(model_id.to_string()))
    }

    /// Whether `model_id` has a run that has not finished yet.
    pub fn is_training(&self, model_id: &str) -> bool {
        self.inner
            .lock()
            .sessions
            .get(model_id)
            .and_then(|s| s.run.as_ref())
            .is_some_and(|run| !run.is_finished())
    }

    /// Raises the stop flag of one session, or of every session when `model_id` is `None`.
    ///
    /// # Returns
    /// The amount of sessions whose flag was raised.
    pub fn cancel(&self, model_id: Option<&str>) -> usize {
        let registry = self.inner.lock();
        let sessions = &registry.sessions;
        match model_id {
            Some(id) => sessions.get(id).map(|s| s.cancel.cancel()).map_or(0, |_| 1),
            None => {
                sessions.values().for_each(|s| s.cancel.cancel());
                sessions.len()
            }
        }
    }

    /// Cancels and forgets a session.
    ///
    /// A run still in flight is kept aside, so a later run of the same id waits for it.
    ///
    /// # Returns
    /// Whether the session existed.
    pub fn remove(&self, model_id: &str) -> bool {
        let mut registry = self.inner.lock();
        registry.draining.retain(|_, run| !run.is_finished());

        let Some(mut session) = registry.sessions.remove(model_id) else {
            return false;
        };

        session.cancel.cancel();
        if let Some(run) = session.run.take()
            && !run.is_finished()
        {
            registry.draining.insert(model_id.to_string(), run);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::{Network, Sequential, activations::ActFn, layers::Dense};

    use super::*;

    fn model() -> TrainedModel {
        let network = Network::new(Sequential::new([Dense::new((1, 1), ActFn::Linear)]), vec![1., 0.]);
        TrainedModel::Digit {
            network: network.unwrap(),
        }
    }

    #[tokio::test]
    async fn restarting_cancels_the_previous_run() {
        let sessions = Sessions::new();
        let mut first = None;
        sessions.start_run("m", |ticket, previous| {
            assert!(previous.is_none());
            first = Some(ticket);
            tokio::spawn(async {})
        });
        let first = first.unwrap();

        let mut second = None;
        sessions.start_run("m", |ticket, previous| {
            assert!(previous.is_some());
            second = Some(ticket);
            tokio::spawn(async {})
        });
        let second = second.unwrap();

        assert!(first.cancel.is_cancelled());
        assert!(!second.cancel.is_cancelled());
        assert!(!sessions.complete_run(&first, model()));
        assert!(sessions.model("m").is_err());
        assert!(sessions.complete_run(&second, model()));
        assert!(sessions.model("m").is_ok());
    }

    #[tokio::test]
    async fn removed_sessions_are_not_found() {
        let sessions = Sessions::new();
        let mut ticket = None;
        sessions.start_run("m", |t, _| {
            ticket = Some(t);
            tokio::spawn(async {})
        });
        let ticket = ticket.unwrap();

        assert!(sessions.remove("m"));
        assert!(ticket.cancel.is_cancelled());
        assert!(!sessions.complete_run(&ticket, model()));
        assert!(matches!(sessions.model("m"), Err(MlErr::SessionNotFound(id)) if id == "m"));
        assert!(!sessions.remove("m"));
    }

    #[tokio::test]
    async fn a_run_after_remove_waits_for_the_removed_one() {
        let sessions = Sessions::new();
        let (release, released) = tokio::sync::oneshot::channel::<()>();

        let mut old = None;
        sessions.start_run("m", |ticket, _| {
            old = Some(ticket);
            tokio::spawn(async move {
                let _ = released.await;
            })
        });
        let old = old.unwrap();
        assert!(sessions.remove("m"));

        let mut new = None;
        let mut previous = None;
        sessions.start_run("m", |ticket, prev| {
            new = Some(ticket);
            previous = prev;
            tokio::spawn(async {})
        });
        let new = new.unwrap();

        let previous = previous.expect("the removed run must be handed over");
        assert!(!previous.is_finished());
        release.send(()).unwrap();
        previous.await.unwrap();

        assert_ne!(old.generation, new.generation);
        assert!(sessions.complete_run(&new, model()));
        assert!(!sessions.complete_run(&old, model()));
    }

    #[tokio::test]
    async fn stale_runs_never_overwrite_a_recreated_session() {
        let sessions = Sessions::new();
        let mut tickets = Vec::new();

        sessions.start_run("m", |ticket, _| {
            tickets.push(ticket);
            tokio::spawn(async {})
        });
        sessions.remove("m");
        sessions.start_run("m", |ticket, _| {
            tickets.push(ticket);
            tokio::spawn(async {})
        });

        let (old, new) = (&tickets[0], &tickets[1]);
        assert!(new.generation > old.generation);

        let newer = TrainedModel::Digit {
            network: Network::new(Sequential::new([Dense::new((1, 1), ActFn::Linear)]), vec![2., 0.])
                .unwrap(),
        };
        assert!(sessions.complete_run(new, newer));
        assert!(!sessions.complete_run(old, model()));
        assert_eq!(sessions.model("m").unwrap().network().params(), &[2., 0.]);
    }

    #[test]
    fn stop_without_id_cancels_everything() {
        let sessions = Sessions::new();
        sessions.insert_model("a", model());
        sessions.insert_model("b", model());

        assert_eq!(sessions.cancel(Some("a")), 1);
        assert_eq!(sessions.cancel(Some("zzz")), 0);
        assert_eq!(sessions.cancel(None), 2);
        assert_eq!(sessions.len(), 2);
    }
}
