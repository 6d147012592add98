use crate::access::DeviceInfo;
use crate::MidiMessage;
use bevy::prelude::*;
use std::collections::HashMap;
use std::fmt::Display;

/// Callback invoked with every message arriving from one input device.
pub type Handler = Box<dyn FnMut(&MidiMessageEvent) + Send + Sync + 'static>;

/// One delivered MIDI message, accessible as an [`Event`](bevy::ecs::event::Event).
#[derive(Event, Clone, Debug)]
pub struct MidiMessageEvent {
    /// Opaque identifier of the input device that produced the message.
    pub device: String,
    /// Backend timestamp in microseconds.
    pub stamp: u64,
    pub message: MidiMessage,
}

impl Display for MidiMessageEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} @ {}", self.device, self.message, self.stamp)
    }
}

/// [`Resource`](bevy::ecs::system::Resource) holding the per-device message
/// handler slots.
///
/// Every input device has a single slot, not a list: attaching to a device
/// that already has a handler silently replaces the previous one, and the
/// replaced handler is never invoked again.
#[derive(Resource, Default)]
pub struct MidiMonitor {
    slots: HashMap<String, Handler>,
}

impl MidiMonitor {
    /// Attach `handler` to the device identified by `id`, replacing any
    /// previous handler for that device.
    pub fn attach(&mut self, id: impl Into<String>, handler: Handler) {
        self.slots.insert(id.into(), handler);
    }

    /// Detach the handler for `id`. Returns whether a handler was attached.
    pub fn detach(&mut self, id: &str) -> bool {
        self.slots.remove(id).is_some()
    }

    /// Attach one handler to every listed device.
    ///
    /// This is a snapshot operation: it covers exactly the devices passed in,
    /// in whatever order the backend enumerated them, and nothing that shows
    /// up later. An empty list attaches nothing.
    pub fn subscribe<F>(&mut self, devices: &[DeviceInfo], mut make_handler: F)
    where
        F: FnMut(&DeviceInfo) -> Handler,
    {
        for device in devices {
            self.attach(device.id.clone(), make_handler(device));
        }
    }

    /// Invoke the handler attached to the event's device. Events for devices
    /// without a handler are dropped.
    pub fn dispatch(&mut self, event: &MidiMessageEvent) {
        if let Some(handler) = self.slots.get_mut(&event.device) {
            handler(event);
        }
    }

    /// Release every handler slot.
    pub fn detach_all(&mut self) {
        self.slots.clear();
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_subscribed(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }
}

/// Build the diagnostic handler attached to every input on grant.
///
/// Writes exactly three lines per message to `sink`, in fixed order: the
/// event as a string, the raw payload bytes, the serialized event. Purely
/// diagnostic; nothing is stored or forwarded.
pub fn logging_handler<S>(mut sink: S) -> Handler
where
    S: FnMut(String) + Send + Sync + 'static,
{
    Box::new(move |event| {
        sink(event.to_string());
        sink(format!("{:?}", event.message.data));
        sink(format!("{event:?}"));
    })
}

pub(crate) fn dispatch_messages(
    mut monitor: ResMut<MidiMonitor>,
    mut messages: EventReader<MidiMessageEvent>,
) {
    for event in messages.read() {
        monitor.dispatch(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn device(id: &str) -> DeviceInfo {
        DeviceInfo {
            id: id.to_string(),
            name: format!("{id} name"),
        }
    }

    fn event(id: &str, data: &[u8]) -> MidiMessageEvent {
        MidiMessageEvent {
            device: id.to_string(),
            stamp: 12345,
            message: data.into(),
        }
    }

    fn counting_handler(counter: Arc<AtomicUsize>) -> Handler {
        Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn empty_snapshot_attaches_nothing() {
        let mut monitor = MidiMonitor::default();
        monitor.subscribe(&[], |_| counting_handler(Arc::default()));
        assert_eq!(monitor.handler_count(), 0);
    }

    #[test]
    fn one_handler_per_device() {
        let mut monitor = MidiMonitor::default();
        let devices = [device("a"), device("b"), device("c")];
        monitor.subscribe(&devices, |_| counting_handler(Arc::default()));

        assert_eq!(monitor.handler_count(), 3);
        for d in &devices {
            assert!(monitor.is_subscribed(&d.id));
        }
    }

    #[test]
    fn subscription_is_order_independent() {
        let mut forward = MidiMonitor::default();
        let mut reverse = MidiMonitor::default();
        let devices = [device("a"), device("b"), device("c")];
        let mut reversed = devices.clone();
        reversed.reverse();

        forward.subscribe(&devices, |_| counting_handler(Arc::default()));
        reverse.subscribe(&reversed, |_| counting_handler(Arc::default()));

        assert_eq!(forward.handler_count(), reverse.handler_count());
        for d in &devices {
            assert!(forward.is_subscribed(&d.id));
            assert!(reverse.is_subscribed(&d.id));
        }
    }

    #[test]
    fn logging_handler_writes_three_lines_in_order() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);

        let mut monitor = MidiMonitor::default();
        monitor.attach("a", logging_handler(move |line| sink.lock().unwrap().push(line)));

        let ev = event("a", &[0x90, 60, 100]);
        monitor.dispatch(&ev);

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], ev.to_string());
        assert_eq!(lines[1], format!("{:?}", ev.message.data));
        assert_eq!(lines[2], format!("{ev:?}"));
    }

    #[test]
    fn reattach_replaces_previous_handler() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let mut monitor = MidiMonitor::default();
        monitor.attach("a", counting_handler(Arc::clone(&first)));
        monitor.dispatch(&event("a", &[0x90, 60, 100]));

        monitor.attach("a", counting_handler(Arc::clone(&second)));
        monitor.dispatch(&event("a", &[0x80, 60, 0]));
        monitor.dispatch(&event("a", &[0x90, 62, 90]));

        assert_eq!(monitor.handler_count(), 1);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dispatch_to_unknown_device_is_a_noop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut monitor = MidiMonitor::default();
        monitor.attach("a", counting_handler(Arc::clone(&counter)));

        monitor.dispatch(&event("b", &[0xF8]));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn detach_all_releases_every_slot() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut monitor = MidiMonitor::default();
        monitor.subscribe(&[device("a"), device("b")], |_| {
            counting_handler(Arc::clone(&counter))
        });

        monitor.detach_all();
        assert_eq!(monitor.handler_count(), 0);

        monitor.dispatch(&event("a", &[0x90, 60, 100]));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
