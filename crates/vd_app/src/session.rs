use vd_core::RootConfig;
use vd_storage::to_json;

/// Remembers the serialized form of the last saved or loaded configuration.
#[derive(Clone, Debug)]
pub struct DirtyStateTracker {
    saved_fingerprint: String,
}

impl DirtyStateTracker {
    pub fn from_config(config: &RootConfig) -> Self {
        Self {
            saved_fingerprint: config_fingerprint(config),
        }
    }

    pub fn is_dirty(&self, config: &RootConfig) -> bool {
        self.saved_fingerprint != config_fingerprint(config)
    }

    pub fn mark_saved(&mut self, config: &RootConfig) {
        self.saved_fingerprint = config_fingerprint(config);
    }
}

fn config_fingerprint(config: &RootConfig) -> String {
    to_json(config).unwrap_or_default()
}
