mod session;
mod settings;
mod sync;

use std::env;
use std::path::Path;

use anyhow::{bail, Context};
use settings::Settings;
use sync::{EditOutcome, SyncCoordinator, SyncError, SyncState};
use vd_core::schema::ResonatorParameter;
use vd_core::select::ResonatorModel;
use vd_core::{ControlPath, PartIndex, RootConfig, StepIndex};
use vd_rt::midi::LoggingMidiOutput;
use vd_rt::SplitChannelSink;
use vd_storage::FileConfigStore;

const CLEAR: &str = "clear";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    Set(ControlPath, i64),
    ClearOverride(PartIndex, StepIndex),
}

/// Parses `parts.overridden-controls.partN.S` into the step it names.
fn parse_override_step(path: &str) -> anyhow::Result<(PartIndex, StepIndex)> {
    match path.split('.').collect::<Vec<_>>().as_slice() {
        ["parts", "overridden-controls", part, step] => {
            Ok((PartIndex::from_key(*part)?, StepIndex::from_key(*step)?))
        }
        _ => bail!("{} does not name an override step", path),
    }
}

/// `path=value` arguments are edits and `step=clear` removes a step override; the
/// first other argument names a settings file.
fn parse_args(
    args: impl IntoIterator<Item = String>,
) -> anyhow::Result<(Option<String>, Vec<Command>)> {
    let mut settings_path = None;
    let mut edits = Vec::new();
    for arg in args {
        match arg.split_once('=') {
            Some((path, CLEAR)) => {
                let (part, step) = parse_override_step(path)?;
                edits.push(Command::ClearOverride(part, step));
            }
            Some((path, value)) => {
                let path: ControlPath = path.parse()?;
                let value: i64 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid value in {}", arg))?;
                edits.push(Command::Set(path, value));
            }
            None if settings_path.is_none() => settings_path = Some(arg),
            None => bail!("unexpected argument {}", arg),
        }
    }
    Ok((settings_path, edits))
}

fn main() -> anyhow::Result<()> {
    let (settings_path, edits) = parse_args(env::args().skip(1))?;
    let mut settings = match &settings_path {
        Some(path) => Settings::load(Path::new(path))?,
        None => Settings::default(),
    };
    settings.apply_env_overrides(|key| env::var(key).ok());

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log_filter.clone()),
    )
    .init();

    let mut store = FileConfigStore::new(settings.config_path.clone());
    let mut coordinator = SyncCoordinator::new(RootConfig::default());
    if let Err(err) = coordinator.load(&mut store) {
        log::warn!("continuing with defaults: {}", err);
    }
    if coordinator.tree().port().is_empty() {
        if let Some(port) = &settings.port {
            coordinator.tree_mut().set_port(port.clone());
        }
    }

    let mut sink = SplitChannelSink::new(LoggingMidiOutput::new(coordinator.tree().port()));
    if coordinator.state() != SyncState::Applying {
        coordinator.request_sync();
    }
    match coordinator.run_to_idle(&mut sink) {
        Ok(report) => log::info!(
            "device in sync: {} updates over {} cycles",
            report.messages_sent_total,
            report.cycles_completed
        ),
        Err(err @ SyncError::Transport { .. }) => log::error!("sync aborted: {}", err),
        Err(err) => return Err(err).context("sync failed"),
    }

    let mut cleared = false;
    for command in edits {
        match command {
            Command::Set(path, value) => match coordinator.edit(&path, value, &mut sink) {
                Ok(EditOutcome::Sent(update)) => log::info!("sent {}", update),
                Ok(outcome) => log::info!("{} = {}: {:?}", path, value, outcome),
                Err(err @ SyncError::Validation(_)) => log::warn!("rejected {}: {}", path, err),
                Err(err) => log::error!("{} = {}: {}", path, value, err),
            },
            Command::ClearOverride(part, step) => {
                if coordinator.remove_override(part, step) {
                    cleared = true;
                } else {
                    log::info!("{} step {} has no override", part, step);
                }
            }
        }
    }
    if cleared && coordinator.state() != SyncState::Applying {
        coordinator.request_sync();
        if let Err(err) = coordinator.run_to_idle(&mut sink) {
            log::error!("sync aborted: {}", err);
        }
    }

    if settings.save_on_exit {
        let saved = coordinator
            .shutdown(&mut store, false)
            .with_context(|| format!("saving {}", settings.config_path.display()))?;
        if saved {
            log::info!("saved {}", store.path().display());
        }
    }

    let report = coordinator.report();
    let model = coordinator
        .tree()
        .get(&ControlPath::Resonator(ResonatorParameter::ResonatorModel))
        .map(ResonatorModel::from_control_value);
    println!(
        "vd_app: port={}, resonator={:?}, state={}, known={}, sent={}, cycles={}, dirty={}",
        coordinator.tree().port(),
        model,
        report.state.label(),
        coordinator.device_state().len(),
        report.messages_sent_total,
        report.cycles_completed,
        coordinator.is_dirty()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{parse_args, Command};
    use vd_core::schema::LayerParameter;
    use vd_core::{ControlPath, LayerId, PartIndex, StepIndex};

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn edits_and_settings_path_are_separated() {
        let (settings, edits) = parse_args(args(&[
            "settings.json",
            "controls.parts.part4.layer1.send-amount=12",
        ]))
        .unwrap();
        assert_eq!(settings.as_deref(), Some("settings.json"));
        assert_eq!(
            edits,
            vec![Command::Set(
                ControlPath::Global {
                    part: PartIndex::new(4).unwrap(),
                    layer: LayerId::Layer1,
                    parameter: LayerParameter::SendAmount,
                },
                12
            )]
        );
    }

    #[test]
    fn clear_argument_names_an_override_step() {
        let (settings, edits) =
            parse_args(args(&["parts.overridden-controls.part2.5=clear"])).unwrap();
        assert_eq!(settings, None);
        assert_eq!(
            edits,
            vec![Command::ClearOverride(
                PartIndex::new(2).unwrap(),
                StepIndex::new(5).unwrap()
            )]
        );

        assert!(parse_args(args(&["parts.overridden-controls.part2.05=clear"])).is_err());
        assert!(parse_args(args(&["controls.parts.part2.layer1.level=clear"])).is_err());
    }

    #[test]
    fn malformed_arguments_are_rejected() {
        assert!(parse_args(args(&["controls.parts.part9.layer1.level=1"])).is_err());
        assert!(parse_args(args(&["controls.parts.part1.layer1.level=loud"])).is_err());
        assert!(parse_args(args(&["a.json", "b.json"])).is_err());
    }
}
