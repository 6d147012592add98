use bevy::app::ScheduleRunnerPlugin;
use bevy::log::{Level, LogPlugin};
use bevy::prelude::*;
use bevy_midi_monitor::prelude::*;
use std::time::Duration;

fn main() {
    App::new()
        .add_plugins((
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_millis(16))),
            LogPlugin {
                level: Level::WARN,
                filter: "bevy_midi_monitor=debug,monitor=info".to_string(),
                update_subscriber: None,
            },
        ))
        .add_plugins(MidiAccessPlugin)
        .add_systems(Update, report_grant)
        .run();
}

fn report_grant(access: Res<MidiAccess>) {
    if !access.is_changed() || access.state() != AccessState::Granted {
        return;
    }
    info!(
        "Access granted: {} input(s), {} output(s), sysex {}, software {}",
        access.inputs().len(),
        access.outputs().len(),
        access.sysex_enabled(),
        access.software_enabled(),
    );
    for device in access.inputs() {
        info!("  input {} ({})", device.id, device.name);
    }
}
