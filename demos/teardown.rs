//! Monitors for five seconds, then releases the access handle and exits.

use bevy::app::{AppExit, ScheduleRunnerPlugin};
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
                filter: "bevy_midi_monitor=debug,teardown=info".to_string(),
                update_subscriber: None,
            },
        ))
        .add_plugins(MidiAccessPlugin)
        .add_systems(Update, teardown_after_five)
        .run();
}

fn teardown_after_five(
    time: Res<Time>,
    access: Res<MidiAccess>,
    monitor: Res<MidiMonitor>,
    mut exit: EventWriter<AppExit>,
    mut requested: Local<bool>,
) {
    if !*requested && time.elapsed_seconds() > 5.0 {
        info!("Tearing down {} handler(s)", monitor.handler_count());
        access.teardown();
        *requested = true;
    }
    if *requested && access.state() == AccessState::TornDown {
        info!("All connections released");
        exit.send(AppExit);
    }
    // A denied request leaves nothing to release.
    if access.state() == AccessState::Denied {
        exit.send(AppExit);
    }
}
