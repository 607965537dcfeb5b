//! Periodic rebuilds of the stitched schema.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::builder::SchemaBuilder;

/// Where the refresh timer is in its cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefreshState {
    /// No timer is armed.
    #[default]
    Idle,
    /// A timer is waiting for its interval to elapse.
    Armed,
    /// The timer fired and a rebuild is running; it re-arms afterwards.
    Firing,
}

#[derive(Debug, Default)]
struct Slot {
    // bumped on every start and stop so a superseded task never re-arms
    generation: u64,
    state: RefreshState,
    stop: Option<oneshot::Sender<()>>,
}

impl Slot {
    fn transition(&mut self, generation: u64, state: RefreshState) -> bool {
        if self.generation != generation {
            return false;
        }
        self.state = state;
        true
    }
}

/// Owns the single refresh timer of a [`Stitcher`](crate::Stitcher).
pub(crate) struct RefreshScheduler {
    builder: Arc<SchemaBuilder>,
    slot: Arc<Mutex<Slot>>,
}

impl RefreshScheduler {
    pub(crate) fn new(builder: Arc<SchemaBuilder>) -> Self {
        Self {
            builder,
            slot: Default::default(),
        }
    }

    /// Arm the timer, replacing any timer already armed.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn start(&self, interval: Duration) {
        let (generation, stop_receiver) = {
            let mut slot = self.slot.lock();
            if let Some(stop) = slot.stop.take() {
                let _ = stop.send(());
            }
            slot.generation += 1;
            slot.state = RefreshState::Armed;
            let (stop_sender, stop_receiver) = oneshot::channel();
            slot.stop = Some(stop_sender);
            (slot.generation, stop_receiver)
        };
        tracing::debug!(interval = ?interval, "remote schema refresh armed");

        tokio::task::spawn(refresh_loop(
            self.builder.clone(),
            self.slot.clone(),
            generation,
            interval,
            stop_receiver,
        ));
    }

    /// Cancel the armed timer. A rebuild already running completes, but the
    /// timer does not re-arm. Does nothing when no timer is armed.
    pub(crate) fn stop(&self) {
        let mut slot = self.slot.lock();
        if let Some(stop) = slot.stop.take() {
            let _ = stop.send(());
            tracing::debug!("remote schema refresh stopped");
        }
        slot.generation += 1;
        slot.state = RefreshState::Idle;
    }

    pub(crate) fn state(&self) -> RefreshState {
        self.slot.lock().state
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn refresh_loop(
    builder: Arc<SchemaBuilder>,
    slot: Arc<Mutex<Slot>>,
    generation: u64,
    interval: Duration,
    mut stop_receiver: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut stop_receiver => return,
            _ = tokio::time::sleep(interval) => {}
        }
        if !slot.lock().transition(generation, RefreshState::Firing) {
            return;
        }
        if let Err(err) = builder.rebuild().await {
            tracing::error!("scheduled refresh of remote schemas failed: {}", err);
        }
        if !slot.lock().transition(generation, RefreshState::Armed) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use test_log::test;

    use super::*;
    use crate::builder::Composition;
    use crate::merge::TypeMerger;
    use crate::subschema::LocalSubschema;
    use crate::subschema::SubschemaConfig;
    use crate::subschema::SubschemaStore;
    use crate::test_harness::MockService;

    fn scheduler(remote: &MockService) -> RefreshScheduler {
        let store = Arc::new(SubschemaStore::new());
        store.append([SubschemaConfig::new(remote.clone())]);
        let local_sdl = "type Query { subtract(x: Int, y: Int): Int }";
        let composition = Composition {
            local: LocalSubschema::parse(local_sdl, MockService::new(local_sdl).unwrap())
                .unwrap(),
            local_options: Default::default(),
            stitch_options: Default::default(),
            merger: Arc::new(TypeMerger),
            federation: None,
        };
        RefreshScheduler::new(Arc::new(SchemaBuilder::new(store, composition, None).unwrap()))
    }

    fn query_fields(scheduler: &RefreshScheduler) -> Vec<String> {
        scheduler
            .builder
            .registry()
            .current_schema()
            .query_fields()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    #[test(tokio::test)]
    async fn stop_without_timer_is_a_no_op() {
        let remote = MockService::new("type Query { add(x: Int, y: Int): Int }").unwrap();
        let scheduler = scheduler(&remote);

        scheduler.stop();
        scheduler.stop();
        assert_eq!(scheduler.state(), RefreshState::Idle);
    }

    #[test(tokio::test)]
    async fn ticks_rebuild_until_stopped() {
        tokio::time::pause();
        let remote = MockService::new("type Query { add(x: Int, y: Int): Int }").unwrap();
        let scheduler = scheduler(&remote);

        scheduler.start(Duration::from_millis(1000));
        assert_eq!(scheduler.state(), RefreshState::Armed);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(remote.introspection_count(), 2);
        assert_eq!(query_fields(&scheduler), vec!["add", "subtract"]);

        scheduler.stop();
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(remote.introspection_count(), 2);
        assert_eq!(scheduler.state(), RefreshState::Idle);
    }

    #[test(tokio::test)]
    async fn restarting_replaces_the_armed_timer() {
        tokio::time::pause();
        let remote = MockService::new("type Query { add(x: Int, y: Int): Int }").unwrap();
        let scheduler = scheduler(&remote);

        scheduler.start(Duration::from_millis(1000));
        scheduler.start(Duration::from_millis(1000));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(remote.introspection_count(), 1);
    }

    #[test(tokio::test)]
    async fn failed_ticks_are_absorbed_and_re_armed() {
        tokio::time::pause();
        let remote = MockService::new("type Query { add(x: Int, y: Int): Int }").unwrap();
        let scheduler = scheduler(&remote);
        remote.set_failing(true);

        scheduler.start(Duration::from_millis(1000));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(scheduler.state(), RefreshState::Armed);
        assert_eq!(query_fields(&scheduler), vec!["subtract"]);

        remote.set_failing(false);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(query_fields(&scheduler), vec!["add", "subtract"]);
    }
}
