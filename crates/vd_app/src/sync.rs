//! Keeps the device in step with the configuration.
//!
//! A sync cycle diffs the configuration against what the device is assumed to
//! hold and sends the difference one update at a time. Requests that arrive while
//! a cycle is applying are coalesced into a single follow-up cycle, diffed against
//! the newest configuration once the current one completes.

use std::collections::VecDeque;

use thiserror::Error;
use vd_core::{diff, ControlPath, ControlTree, DiffEntry, LeafPath, PartIndex, RootConfig};
use vd_core::{Snapshot, StepIndex, ValidationError};
use vd_rt::{ParameterSink, ParameterUpdate, TransportError};
use vd_storage::{from_json, to_json, ConfigStore, PersistenceError, StorageError};

use crate::session::DirtyStateTracker;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Loading,
    Diffing,
    Applying,
    Error,
}

impl SyncState {
    pub fn label(self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Loading => "loading",
            SyncState::Diffing => "diffing",
            SyncState::Applying => "applying",
            SyncState::Error => "error",
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("transport failure after {applied} of {planned} updates: {source}")]
    Transport {
        applied: usize,
        planned: usize,
        #[source]
        source: TransportError,
    },
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    /// Nothing was stored yet; the session starts from defaults.
    Defaulted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditOutcome {
    /// The value already matched; nothing was sent.
    Unchanged,
    Sent(ParameterUpdate),
    /// A step override: stored, but the device has no parameter for it.
    Local,
    /// Stored; a sync cycle will deliver it.
    Deferred,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncReport {
    pub state: SyncState,
    pub planned: usize,
    pub applied: usize,
    pub pending: usize,
    pub messages_sent_total: u64,
    pub cycles_completed: u64,
    pub resync_pending: bool,
}

pub struct SyncCoordinator {
    tree: ControlTree,
    device_state: Snapshot,
    state: SyncState,
    plan: VecDeque<DiffEntry>,
    planned: usize,
    applied: usize,
    resync_pending: bool,
    messages_sent_total: u64,
    cycles_completed: u64,
    dirty: DirtyStateTracker,
}

impl SyncCoordinator {
    pub fn new(config: RootConfig) -> Self {
        Self {
            dirty: DirtyStateTracker::from_config(&config),
            tree: ControlTree::new(config),
            device_state: Snapshot::unknown(),
            state: SyncState::Idle,
            plan: VecDeque::new(),
            planned: 0,
            applied: 0,
            resync_pending: false,
            messages_sent_total: 0,
            cycles_completed: 0,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn tree(&self) -> &ControlTree {
        &self.tree
    }

    /// Direct access for sequencer edits; changes reach the device on the next
    /// [`request_sync`](Self::request_sync).
    pub fn tree_mut(&mut self) -> &mut ControlTree {
        &mut self.tree
    }

    pub fn device_state(&self) -> &Snapshot {
        &self.device_state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty(self.tree.config())
    }

    pub fn report(&self) -> SyncReport {
        SyncReport {
            state: self.state,
            planned: self.planned,
            applied: self.applied,
            pending: self.plan.len(),
            messages_sent_total: self.messages_sent_total,
            cycles_completed: self.cycles_completed,
            resync_pending: self.resync_pending,
        }
    }

    /// Replaces the configuration with the stored document and plans a sync, at
    /// startup or as an explicit reload. Anything still queued is dropped.
    /// A missing document starts from defaults. Any other failure falls back to
    /// defaults too, but leaves the coordinator in `Error` and returns the cause.
    pub fn load(&mut self, store: &mut dyn ConfigStore) -> Result<LoadStatus, SyncError> {
        self.cancel();
        self.state = SyncState::Loading;

        let loaded = store
            .load()
            .map_err(SyncError::from)
            .and_then(|text| from_json(&text).map_err(SyncError::from));
        let (config, status) = match loaded {
            Ok(config) => (config, LoadStatus::Loaded),
            Err(SyncError::Persistence(err)) if err.is_not_found() => {
                log::info!("{}; starting from defaults", err);
                (RootConfig::default(), LoadStatus::Defaulted)
            }
            Err(err) => {
                log::warn!("load failed, falling back to defaults: {}", err);
                self.replace_config(RootConfig::default());
                self.state = SyncState::Error;
                return Err(err);
            }
        };

        self.replace_config(config);
        self.state = SyncState::Diffing;
        self.request_sync();
        Ok(status)
    }

    fn replace_config(&mut self, config: RootConfig) {
        self.dirty.mark_saved(&config);
        self.tree = ControlTree::new(config);
    }

    /// Plans a cycle against the assumed device state. While a cycle is applying
    /// the request is only remembered. Returns the number of planned entries.
    pub fn request_sync(&mut self) -> usize {
        if self.state == SyncState::Applying {
            if !self.resync_pending {
                log::info!("sync requested while applying; coalescing");
            }
            self.resync_pending = true;
            return 0;
        }

        self.state = SyncState::Diffing;
        self.plan = diff(&self.device_state, &self.tree.snapshot()).into();
        self.planned = self.plan.len();
        self.applied = 0;
        log::debug!("sync cycle planned with {} entries", self.planned);

        if self.plan.is_empty() {
            self.finish_cycle();
        } else {
            self.state = SyncState::Applying;
        }
        self.planned
    }

    /// Applies the next planned entry. Returns `false` when nothing is applying.
    pub fn apply_next(&mut self, sink: &mut dyn ParameterSink) -> Result<bool, SyncError> {
        if self.state != SyncState::Applying {
            return Ok(false);
        }
        let Some(entry) = self.plan.pop_front() else {
            self.finish_cycle();
            return Ok(false);
        };

        // Device values are read from the tree at send time; edits made after the
        // plan was computed supersede the planned value.
        let target = if entry.path.is_device_addressable() {
            entry
                .path
                .control_path()
                .and_then(|path| self.tree.get(&path))
                .map(|value| u16::from(value.get()))
        } else {
            entry.new
        };
        if target != self.device_state.get(&entry.path) {
            let update = target.and_then(|value| ParameterUpdate::for_leaf(&entry.path, value));
            if let Some(update) = update {
                if let Err(source) = sink.send_parameter_update(&update) {
                    return Err(self.fail_cycle(entry.path, source));
                }
                self.messages_sent_total = self.messages_sent_total.saturating_add(1);
            }
            self.device_state.record(entry.path, target);
        }
        self.applied += 1;

        if self.plan.is_empty() {
            self.finish_cycle();
        }
        Ok(true)
    }

    /// Applies until the coordinator is no longer applying, follow-up cycles included.
    pub fn run_to_idle(&mut self, sink: &mut dyn ParameterSink) -> Result<SyncReport, SyncError> {
        while self.apply_next(sink)? {}
        Ok(self.report())
    }

    /// Validates and stores one value, then sends it if the device has a parameter
    /// for it and is not already known to hold it. On a validation error nothing
    /// changes.
    pub fn edit(
        &mut self,
        path: &ControlPath,
        value: i64,
        sink: &mut dyn ParameterSink,
    ) -> Result<EditOutcome, SyncError> {
        self.tree.set(path, value)?;
        let Some(current) = self.tree.get(path) else {
            return Ok(EditOutcome::Unchanged);
        };
        let leaf = LeafPath::from(*path);
        if self.device_state.get(&leaf) == Some(u16::from(current.get())) {
            return Ok(EditOutcome::Unchanged);
        }

        if self.state != SyncState::Idle {
            self.resync_pending |= self.state == SyncState::Applying;
            return Ok(EditOutcome::Deferred);
        }

        match ParameterUpdate::for_control(path, current) {
            Some(update) => {
                if let Err(source) = sink.send_parameter_update(&update) {
                    self.planned = 1;
                    self.applied = 0;
                    return Err(self.fail_cycle(leaf, source));
                }
                self.messages_sent_total = self.messages_sent_total.saturating_add(1);
                self.device_state
                    .record(leaf, Some(u16::from(current.get())));
                Ok(EditOutcome::Sent(update))
            }
            None => {
                self.device_state
                    .record(leaf, Some(u16::from(current.get())));
                Ok(EditOutcome::Local)
            }
        }
    }

    pub fn remove_override(&mut self, part: PartIndex, step: StepIndex) -> bool {
        let removed = self.tree.remove_override(part, step);
        if removed && self.state == SyncState::Applying {
            self.resync_pending = true;
        }
        removed
    }

    /// Suppresses every queued update. An update already handed to the sink is not
    /// recalled. Returns how many were dropped.
    pub fn cancel(&mut self) -> usize {
        let dropped = self.plan.len();
        self.plan.clear();
        self.resync_pending = false;
        if self.state == SyncState::Applying {
            log::info!("sync cancelled with {} updates unsent", dropped);
            self.state = SyncState::Idle;
        }
        dropped
    }

    /// Writes the configuration out. On failure the in-memory state is kept and
    /// stays dirty.
    pub fn save(&mut self, store: &mut dyn ConfigStore) -> Result<(), SyncError> {
        let text = to_json(self.tree.config())?;
        if let Err(err) = store.save(&text) {
            log::error!("save failed: {}", err);
            return Err(err.into());
        }
        self.dirty.mark_saved(self.tree.config());
        Ok(())
    }

    /// Stops syncing and saves when there are unsaved changes (or always, with
    /// `force`). Returns whether a save happened.
    pub fn shutdown(&mut self, store: &mut dyn ConfigStore, force: bool) -> Result<bool, SyncError> {
        self.cancel();
        if !force && !self.is_dirty() {
            return Ok(false);
        }
        self.save(store)?;
        Ok(true)
    }

    fn finish_cycle(&mut self) {
        self.cycles_completed = self.cycles_completed.saturating_add(1);
        log::debug!(
            "sync cycle finished: {} of {} entries applied",
            self.applied,
            self.planned
        );
        self.state = SyncState::Idle;
        if std::mem::take(&mut self.resync_pending) {
            self.request_sync();
        }
    }

    fn fail_cycle(&mut self, path: LeafPath, source: TransportError) -> SyncError {
        // The device may or may not hold the value now.
        self.device_state.record(path, None);
        let dropped = self.plan.len();
        self.plan.clear();
        self.resync_pending = false;
        self.state = SyncState::Error;
        log::error!(
            "transport failure at {} after {} of {} updates, {} dropped: {}",
            path,
            self.applied,
            self.planned,
            dropped,
            source
        );
        SyncError::Transport {
            applied: self.applied,
            planned: self.planned,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EditOutcome, LoadStatus, SyncCoordinator, SyncError, SyncState};
    use vd_core::schema::{LayerParameter, ResonatorParameter};
    use vd_core::{ControlPath, LayerId, LeafPath, PartIndex, RootConfig, StepIndex};
    use vd_rt::RecordingSink;
    use vd_storage::{to_json, ConfigStore, MemoryConfigStore};

    const FULL_SYNC: usize = 6 * 20 + 4 + 3 + 6;

    fn global(part: i64, layer: LayerId, parameter: LayerParameter) -> ControlPath {
        ControlPath::Global {
            part: PartIndex::new(part).unwrap(),
            layer,
            parameter,
        }
    }

    fn synced() -> (SyncCoordinator, RecordingSink) {
        let mut coordinator = SyncCoordinator::new(RootConfig::default());
        let mut sink = RecordingSink::default();
        coordinator.request_sync();
        coordinator.run_to_idle(&mut sink).unwrap();
        sink.clear();
        (coordinator, sink)
    }

    #[test]
    fn first_sync_sends_every_device_parameter_once() {
        let mut coordinator = SyncCoordinator::new(RootConfig::default());
        let mut sink = RecordingSink::default();

        assert_eq!(coordinator.request_sync(), FULL_SYNC);
        assert_eq!(coordinator.state(), SyncState::Applying);
        let report = coordinator.run_to_idle(&mut sink).unwrap();

        assert_eq!(report.state, SyncState::Idle);
        assert_eq!(report.applied, FULL_SYNC);
        assert_eq!(sink.updates().len(), 6 * 20 + 4);
        assert_eq!(sink.updates()[0].parameter, "resonator-model");
        assert_eq!(sink.updates()[4].part, PartIndex::new(1).ok());

        assert_eq!(coordinator.request_sync(), 0);
        assert_eq!(coordinator.state(), SyncState::Idle);
    }

    #[test]
    fn edit_sends_exactly_one_update() {
        let (mut coordinator, mut sink) = synced();
        let path = global(4, LayerId::Layer1, LayerParameter::SendAmount);

        let outcome = coordinator.edit(&path, 12, &mut sink).unwrap();
        assert!(matches!(outcome, EditOutcome::Sent(_)));
        assert_eq!(sink.updates().len(), 1);
        assert_eq!(sink.updates()[0].to_string(), "part4.layer1.send-amount=12");

        assert_eq!(
            coordinator.edit(&path, 12, &mut sink).unwrap(),
            EditOutcome::Unchanged
        );
        assert_eq!(sink.updates().len(), 1);
        assert_eq!(coordinator.request_sync(), 0);
    }

    #[test]
    fn rejected_edit_changes_nothing() {
        let (mut coordinator, mut sink) = synced();
        let before = coordinator.tree().clone();

        let err = coordinator
            .edit(
                &global(4, LayerId::Layer1, LayerParameter::SendAmount),
                128,
                &mut sink,
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(coordinator.tree(), &before);
        assert!(sink.updates().is_empty());
        assert_eq!(coordinator.state(), SyncState::Idle);
    }

    #[test]
    fn override_edits_stay_local() {
        let (mut coordinator, mut sink) = synced();
        let path = ControlPath::Override {
            part: PartIndex::new(2).unwrap(),
            step: StepIndex::new(5).unwrap(),
            layer: LayerId::Layer1,
            parameter: LayerParameter::Level,
        };

        assert_eq!(
            coordinator.edit(&path, 90, &mut sink).unwrap(),
            EditOutcome::Local
        );
        assert!(sink.updates().is_empty());
        assert!(coordinator.remove_override(PartIndex::new(2).unwrap(), StepIndex::new(5).unwrap()));
        assert_eq!(coordinator.tree().get(&path).unwrap().get(), 64);

        // Removing the override is a local diff entry, not a device message.
        assert_eq!(coordinator.request_sync(), 1);
        coordinator.run_to_idle(&mut sink).unwrap();
        assert!(sink.updates().is_empty());
    }

    #[test]
    fn sync_requested_while_applying_runs_after_the_current_cycle() {
        let (mut coordinator, mut sink) = synced();
        let early = ControlPath::Resonator(ResonatorParameter::DecayTime);
        let late = global(6, LayerId::Layer2, LayerParameter::Level);

        coordinator.tree_mut().set(&early, 1).unwrap();
        coordinator.tree_mut().set(&late, 2).unwrap();
        assert_eq!(coordinator.request_sync(), 2);

        assert!(coordinator.apply_next(&mut sink).unwrap());
        assert_eq!(
            coordinator.edit(&late, 3, &mut sink).unwrap(),
            EditOutcome::Deferred
        );
        assert_eq!(coordinator.request_sync(), 0);
        assert!(coordinator.report().resync_pending);

        coordinator.run_to_idle(&mut sink).unwrap();
        let sent: Vec<_> = sink.updates().iter().map(|u| u.to_string()).collect();
        assert_eq!(sent, ["resonator.decay-time=1", "part6.layer2.level=3"]);
        assert_eq!(coordinator.state(), SyncState::Idle);
        assert_eq!(coordinator.report().cycles_completed, 3);
    }

    #[test]
    fn edit_reverting_a_queued_change_sends_nothing_for_it() {
        let (mut coordinator, mut sink) = synced();
        let first = global(1, LayerId::Layer1, LayerParameter::Level);
        let last = global(6, LayerId::Layer2, LayerParameter::Level);

        coordinator.tree_mut().set(&first, 1).unwrap();
        coordinator.tree_mut().set(&last, 2).unwrap();
        assert_eq!(coordinator.request_sync(), 2);
        assert!(coordinator.apply_next(&mut sink).unwrap());

        assert_eq!(
            coordinator.edit(&last, 64, &mut sink).unwrap(),
            EditOutcome::Unchanged
        );
        coordinator.run_to_idle(&mut sink).unwrap();

        let sent: Vec<_> = sink.updates().iter().map(|u| u.to_string()).collect();
        assert_eq!(sent, ["part1.layer1.level=1"]);
        assert_eq!(
            coordinator.device_state().get(&LeafPath::from(last)),
            Some(64)
        );
        assert_eq!(coordinator.request_sync(), 0);
    }

    #[test]
    fn edit_after_cancel_sends_values_the_device_never_got() {
        let mut coordinator = SyncCoordinator::new(RootConfig::default());
        let mut sink = RecordingSink::default();
        coordinator.request_sync();
        coordinator.apply_next(&mut sink).unwrap();
        coordinator.cancel();
        sink.clear();

        // Unchanged in the tree, but never delivered.
        let path = global(6, LayerId::Layer2, LayerParameter::Level);
        let outcome = coordinator.edit(&path, 64, &mut sink).unwrap();
        assert!(matches!(outcome, EditOutcome::Sent(_)));
        assert_eq!(sink.updates()[0].to_string(), "part6.layer2.level=64");

        assert_eq!(
            coordinator.edit(&path, 64, &mut sink).unwrap(),
            EditOutcome::Unchanged
        );
        assert_eq!(sink.updates().len(), 1);
    }

    #[test]
    fn failed_edit_send_forgets_the_leaf() {
        let (mut coordinator, _) = synced();
        let mut sink = RecordingSink::failing_after(0);
        let path = global(3, LayerId::Layer1, LayerParameter::Pitch);

        let err = coordinator.edit(&path, 90, &mut sink).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Transport {
                applied: 0,
                planned: 1,
                ..
            }
        ));
        assert_eq!(coordinator.state(), SyncState::Error);
        assert_eq!(coordinator.device_state().get(&LeafPath::from(path)), None);
        assert_eq!(coordinator.tree().get(&path).unwrap().get(), 90);

        sink.reconnect();
        assert_eq!(coordinator.request_sync(), 1);
        coordinator.run_to_idle(&mut sink).unwrap();
        assert_eq!(sink.updates()[0].to_string(), "part3.layer1.pitch=90");
    }

    #[test]
    fn transport_failure_leaves_a_prefix_applied() {
        let mut coordinator = SyncCoordinator::new(RootConfig::default());
        let mut sink = RecordingSink::failing_after(10);

        coordinator.request_sync();
        let err = coordinator.run_to_idle(&mut sink).unwrap_err();
        match err {
            SyncError::Transport {
                applied, planned, ..
            } => {
                assert_eq!(applied, 10);
                assert_eq!(planned, FULL_SYNC);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(coordinator.state(), SyncState::Error);
        assert_eq!(coordinator.report().pending, 0);
        assert_eq!(sink.updates().len(), 10);

        // Retrying is up to the caller and only sends what is still missing.
        sink.reconnect();
        assert_eq!(coordinator.request_sync(), FULL_SYNC - 10);
        coordinator.run_to_idle(&mut sink).unwrap();
        assert_eq!(sink.updates().len(), 6 * 20 + 4);
    }

    #[test]
    fn cancel_suppresses_queued_updates() {
        let mut coordinator = SyncCoordinator::new(RootConfig::default());
        let mut sink = RecordingSink::default();
        coordinator.request_sync();
        coordinator.apply_next(&mut sink).unwrap();

        assert_eq!(coordinator.cancel(), FULL_SYNC - 1);
        assert_eq!(coordinator.state(), SyncState::Idle);
        assert!(!coordinator.apply_next(&mut sink).unwrap());
        assert_eq!(sink.updates().len(), 1);
    }

    #[test]
    fn load_missing_document_starts_from_defaults() {
        let mut coordinator = SyncCoordinator::new(RootConfig::default());
        let mut store = MemoryConfigStore::default();

        assert_eq!(coordinator.load(&mut store).unwrap(), LoadStatus::Defaulted);
        assert_eq!(coordinator.state(), SyncState::Applying);
        assert_eq!(coordinator.tree().config(), &RootConfig::default());
    }

    #[test]
    fn load_stored_document_plans_its_values() {
        let mut config = RootConfig::default();
        config.port = "UM-ONE 1".to_string();
        config.parts.set_tempo(150).unwrap();
        let mut store = MemoryConfigStore::with_document(to_json(&config).unwrap());
        let mut coordinator = SyncCoordinator::new(RootConfig::default());

        assert_eq!(coordinator.load(&mut store).unwrap(), LoadStatus::Loaded);
        assert_eq!(coordinator.tree().port(), "UM-ONE 1");
        assert_eq!(coordinator.report().planned, FULL_SYNC);
        assert!(!coordinator.is_dirty());
    }

    #[test]
    fn invalid_document_falls_back_to_defaults_in_error() {
        let mut store = MemoryConfigStore::with_document("{\"port\": \"x\"}");
        let mut coordinator = SyncCoordinator::new(RootConfig::default());
        coordinator.tree_mut().set_port("previous");

        let err = coordinator.load(&mut store).unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
        assert_eq!(coordinator.state(), SyncState::Error);
        assert_eq!(coordinator.tree().config(), &RootConfig::default());
        assert_eq!(coordinator.report().pending, 0);
    }

    #[test]
    fn reload_during_apply_drops_the_old_plan() {
        let mut store = MemoryConfigStore::with_document(to_json(&RootConfig::default()).unwrap());
        let mut coordinator = SyncCoordinator::new(RootConfig::default());
        let mut sink = RecordingSink::default();
        coordinator.request_sync();
        for _ in 0..5 {
            coordinator.apply_next(&mut sink).unwrap();
        }

        coordinator.load(&mut store).unwrap();
        assert_eq!(coordinator.report().planned, FULL_SYNC - 5);
        coordinator.run_to_idle(&mut sink).unwrap();
        assert_eq!(sink.updates().len(), 6 * 20 + 4);
    }

    #[test]
    fn failed_save_keeps_state_and_dirtiness() {
        let (mut coordinator, mut sink) = synced();
        let mut store = MemoryConfigStore::default();
        coordinator
            .edit(&global(1, LayerId::Layer1, LayerParameter::Pitch), 5, &mut sink)
            .unwrap();
        assert!(coordinator.is_dirty());

        store.set_fail_saves(true);
        let err = coordinator.save(&mut store).unwrap_err();
        assert!(matches!(err, SyncError::Persistence(_)));
        assert!(coordinator.is_dirty());
        assert_eq!(
            coordinator
                .tree()
                .get(&global(1, LayerId::Layer1, LayerParameter::Pitch))
                .unwrap()
                .get(),
            5
        );

        store.set_fail_saves(false);
        assert!(coordinator.shutdown(&mut store, false).unwrap());
        assert!(!coordinator.is_dirty());
        assert!(!coordinator.shutdown(&mut store, false).unwrap());
        assert_eq!(store.save_count(), 1);
        assert!(store.load().unwrap().contains("\"pitch\": 5"));
    }
}
