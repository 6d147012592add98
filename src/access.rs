use crate::monitor::{dispatch_messages, logging_handler, MidiMessageEvent, MidiMonitor};
use bevy::prelude::*;
use bevy::tasks::IoTaskPool;
use crossbeam_channel::{Receiver, Sender};
use midir::Ignore;
use std::error::Error;
use std::fmt::Display;
use MidiAccessError::{DeviceConnectError, PortEnumerationError, RequestDenied};

/// Requests access to the platform MIDI subsystem on startup and logs every
/// message arriving on the input devices present at grant time.
pub struct MidiAccessPlugin;

impl Plugin for MidiAccessPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<MidiAccessSettings>()
            .init_resource::<MidiMonitor>()
            .add_event::<MidiAccessError>()
            .add_event::<MidiMessageEvent>()
            .add_systems(Startup, setup)
            .add_systems(PreUpdate, reply)
            .add_systems(Update, dispatch_messages);
    }
}

/// Settings for [`MidiAccessPlugin`].
///
/// This resource must be added before [`MidiAccessPlugin`] to take effect.
#[derive(Resource, Clone, Debug)]
pub struct MidiAccessSettings {
    pub client_name: &'static str,
    /// Request system-exclusive access. When not requested, incoming sysex
    /// messages are masked out and never reach the handlers.
    pub sysex: bool,
    /// Request software synthesizer ports. Advisory: native backends do not
    /// distinguish software synthesizers and expose every port regardless.
    pub software: bool,
}

impl Default for MidiAccessSettings {
    fn default() -> Self {
        MidiAccessSettings {
            client_name: "bevy_midi_monitor",
            sysex: false,
            software: false,
        }
    }
}

/// One enumerated MIDI device, as seen when access was granted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceInfo {
    /// Opaque, backend-assigned identifier.
    pub id: String,
    pub name: String,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AccessState {
    /// The request is in flight.
    #[default]
    Pending,
    Granted,
    /// The platform refused the request. Terminal: no device is monitored.
    Denied,
    /// [`MidiAccess::teardown`] completed and every connection was released.
    TornDown,
}

/// [`Resource`](bevy::ecs::system::Resource) holding the MIDI access handle.
///
/// The device lists are a snapshot taken when access was granted; devices
/// plugged in afterwards are not observed. Change detection fires when the
/// request resolves and when the handle is torn down.
#[derive(Resource)]
pub struct MidiAccess {
    sender: Sender<Command>,
    receiver: Receiver<Reply>,
    inputs: Vec<DeviceInfo>,
    outputs: Vec<DeviceInfo>,
    sysex_enabled: bool,
    software_enabled: bool,
    state: AccessState,
}

impl MidiAccess {
    pub(crate) fn new(sender: Sender<Command>, receiver: Receiver<Reply>) -> Self {
        MidiAccess {
            sender,
            receiver,
            inputs: Vec::new(),
            outputs: Vec::new(),
            sysex_enabled: false,
            software_enabled: false,
            state: AccessState::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> AccessState {
        self.state
    }

    /// The monitored input devices. Empty until access is granted, and again
    /// after teardown.
    #[must_use]
    pub fn inputs(&self) -> &[DeviceInfo] {
        &self.inputs
    }

    /// The output devices seen at grant time. Enumeration only; nothing is
    /// ever sent to them.
    #[must_use]
    pub fn outputs(&self) -> &[DeviceInfo] {
        &self.outputs
    }

    #[must_use]
    pub fn sysex_enabled(&self) -> bool {
        self.sysex_enabled
    }

    /// Whether software synthesizer ports were requested. Reported as
    /// granted; native backends expose every port either way.
    #[must_use]
    pub fn software_enabled(&self) -> bool {
        self.software_enabled
    }

    /// Release every backend connection. Handler slots in [`MidiMonitor`]
    /// are cleared once the backend confirms with [`AccessState::TornDown`].
    pub fn teardown(&self) {
        // The task is already gone after a denial; nothing left to release.
        let _ = self.sender.send(Command::Teardown);
    }
}

/// The [`Error`] type for access acquisition, accessible as an
/// [`Event`](bevy::ecs::event::Event).
#[derive(Clone, Debug, Event)]
pub enum MidiAccessError {
    /// The platform refused the access request outright.
    RequestDenied(String),
    /// One input device could not be connected; the others still are.
    DeviceConnectError { device: String, message: String },
    PortEnumerationError,
}

impl Error for MidiAccessError {}
impl Display for MidiAccessError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        match self {
            RequestDenied(reason) => write!(f, "MIDI access request denied: {reason}")?,
            DeviceConnectError { device, message } => {
                write!(f, "Couldn't connect to input device '{device}': {message}")?;
            }
            PortEnumerationError => write!(f, "Couldn't enumerate MIDI ports")?,
        }
        Ok(())
    }
}

fn setup(mut commands: Commands, settings: Res<MidiAccessSettings>) {
    let (c_sender, c_receiver) = crossbeam_channel::unbounded();
    let (r_sender, r_receiver) = crossbeam_channel::unbounded();

    let thread_pool = IoTaskPool::get();
    thread_pool
        .spawn(access_task(c_receiver, r_sender, settings.clone()))
        .detach();

    commands.insert_resource(MidiAccess::new(c_sender, r_receiver));
}

fn reply(
    mut access: ResMut<MidiAccess>,
    mut monitor: ResMut<MidiMonitor>,
    mut messages: EventWriter<MidiMessageEvent>,
    mut errors: EventWriter<MidiAccessError>,
) {
    while let Ok(msg) = access.receiver.try_recv() {
        match msg {
            Reply::Granted {
                inputs,
                outputs,
                sysex_enabled,
                software_enabled,
            } => {
                // The snapshot is immutable between Granted and TornDown;
                // only a pending request may resolve into a grant.
                if access.state != AccessState::Pending {
                    continue;
                }
                access.inputs = inputs;
                access.outputs = outputs;
                access.sysex_enabled = sysex_enabled;
                access.software_enabled = software_enabled;
                access.state = AccessState::Granted;
                monitor.subscribe(&access.inputs, |device| {
                    info!("Monitoring input device '{}'", device.name);
                    logging_handler(|line| debug!("{line}"))
                });
            }
            Reply::Denied(reason) => {
                access.state = AccessState::Denied;
                let e = RequestDenied(reason);
                warn!("{}", e);
                errors.send(e);
            }
            Reply::Message(event) => {
                messages.send(event);
            }
            Reply::Error(e) => {
                warn!("{}", e);
                errors.send(e);
            }
            Reply::TornDown => {
                access.state = AccessState::TornDown;
                access.inputs.clear();
                access.outputs.clear();
                monitor.detach_all();
            }
        }
    }
}

pub(crate) enum Command {
    Teardown,
}

pub(crate) enum Reply {
    Granted {
        inputs: Vec<DeviceInfo>,
        outputs: Vec<DeviceInfo>,
        sysex_enabled: bool,
        software_enabled: bool,
    },
    Denied(String),
    Message(MidiMessageEvent),
    Error(MidiAccessError),
    TornDown,
}

async fn access_task(
    receiver: Receiver<Command>,
    sender: Sender<Reply>,
    settings: MidiAccessSettings,
) -> Result<(), crossbeam_channel::SendError<Reply>> {
    use Command::Teardown;

    let probe = match midir::MidiInput::new(settings.client_name) {
        Ok(probe) => probe,
        Err(e) => {
            sender.send(Reply::Denied(e.to_string()))?;
            return Ok(());
        }
    };

    let ignore = if settings.sysex {
        Ignore::None
    } else {
        Ignore::Sysex
    };

    let in_ports = probe.ports();
    let mut inputs = Vec::with_capacity(in_ports.len());
    let mut connections = Vec::with_capacity(in_ports.len());

    for port in &in_ports {
        let name = match probe.port_name(port) {
            Ok(name) => name,
            Err(_) => {
                sender.send(Reply::Error(PortEnumerationError))?;
                continue;
            }
        };

        // `connect` consumes the client, so every port gets its own.
        let mut client = match midir::MidiInput::new(settings.client_name) {
            Ok(client) => client,
            Err(e) => {
                sender.send(Reply::Error(DeviceConnectError {
                    device: name,
                    message: e.to_string(),
                }))?;
                continue;
            }
        };
        client.ignore(ignore);

        let id = port.id();
        let message_sender = sender.clone();
        match client.connect(
            port,
            settings.client_name,
            {
                let id = id.clone();
                move |stamp, bytes, _| {
                    let _ = message_sender.send(Reply::Message(MidiMessageEvent {
                        device: id.clone(),
                        stamp,
                        message: bytes.into(),
                    }));
                }
            },
            (),
        ) {
            Ok(connection) => {
                connections.push(connection);
                inputs.push(DeviceInfo { id, name });
            }
            Err(e) => {
                sender.send(Reply::Error(DeviceConnectError {
                    device: name,
                    message: e.to_string(),
                }))?;
            }
        }
    }

    // Outputs are enumerated for the handle only; nothing is sent to them.
    let outputs = match midir::MidiOutput::new(settings.client_name) {
        Ok(output) => output
            .ports()
            .iter()
            .filter_map(|port| {
                output.port_name(port).ok().map(|name| DeviceInfo {
                    id: port.id(),
                    name,
                })
            })
            .collect(),
        Err(_) => Vec::new(),
    };

    sender.send(Reply::Granted {
        inputs,
        outputs,
        sysex_enabled: settings.sysex,
        software_enabled: settings.software,
    })?;

    // Connections stay open until torn down or the app side goes away.
    while let Ok(command) = receiver.recv() {
        match command {
            Teardown => {
                for connection in connections {
                    let _ = connection.close();
                }
                sender.send(Reply::TornDown)?;
                return Ok(());
            }
        }
    }
    Ok(())
}
