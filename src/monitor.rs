use crate::{
    display::DeviceDisplay,
    midi::{DeviceEvent, DeviceInfo, MidiData, MidiInputProvider, NoteEvent},
};
use std::{cell::RefCell, rc::Rc};

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("midi access has not been granted")]
    NotInitialized,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessState {
    Uninitialized,
    AccessPending,
    AccessGranted,
    AccessDenied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type NoteListener = Box<dyn FnMut(&NoteEvent)>;

/// Tracks available MIDI input devices, routes the active device's raw
/// messages through the note decoder and notifies subscribed listeners.
///
/// At most one device is active at a time. Switching devices always
/// detaches the previous message handler before attaching the new one,
/// and messages still queued from a previously active device are
/// discarded rather than decoded.
pub struct InputMonitor {
    provider: Box<dyn MidiInputProvider>,
    state: AccessState,
    devices: Vec<DeviceInfo>,
    active_input: Option<DeviceInfo>,
    display: Option<Rc<RefCell<dyn DeviceDisplay>>>,
    listeners: Vec<(ListenerId, NoteListener)>,
    next_listener_id: u64,
}

impl InputMonitor {
    pub fn new(provider: Box<dyn MidiInputProvider>) -> Self {
        Self {
            provider,
            state: AccessState::Uninitialized,
            devices: vec![],
            active_input: None,
            display: None,
            listeners: vec![],
            next_listener_id: 0,
        }
    }

    pub fn access_state(&self) -> AccessState {
        self.state
    }

    pub fn active_input(&self) -> Option<&DeviceInfo> {
        self.active_input.as_ref()
    }

    /// Request platform MIDI access and populate the display target with
    /// the currently available devices. A rejected request is logged and
    /// leaves the monitor inert until `initialize` is called again; it is
    /// never propagated as an error.
    pub fn initialize(&mut self, display: Rc<RefCell<dyn DeviceDisplay>>) {
        self.state = AccessState::AccessPending;

        if let Err(e) = self.provider.request_access() {
            log::error!("midi access rejected : {e}");
            self.state = AccessState::AccessDenied;
            self.provider.disconnect_input();
            self.active_input = None;
            self.devices.clear();
            if let Some(display) = self.display.take() {
                display.borrow_mut().clear_devices();
            }
            return;
        }

        log::info!("midi access gained");
        self.state = AccessState::AccessGranted;
        self.display = Some(display);
        self.refresh_devices();
    }

    /// The currently known input devices.
    pub fn list_inputs(&self) -> Result<&[DeviceInfo], MonitorError> {
        self.ensure_granted()?;
        Ok(self.devices.as_slice())
    }

    /// Route messages from the device matching `device_id` to the
    /// listeners. An unknown id clears the active input instead of
    /// failing, leaving no device routed.
    pub fn select_input(&mut self, device_id: &str) -> Result<(), MonitorError> {
        self.ensure_granted()?;

        // detach before attach, so no handler is ever doubled up
        self.provider.disconnect_input();
        self.active_input = None;

        let Some(device) = self.devices.iter().find(|d| d.id == device_id).cloned() else {
            log::warn!("unknown midi device {device_id}, cleared active input");
            return Ok(());
        };

        self.provider.connect_input(&device.id)?;
        log::info!("routing midi input {device_id}");
        self.active_input = Some(device);
        Ok(())
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&NoteEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) {
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
    }

    /// Drain the provider's pending events without blocking. Decoded note
    /// events are delivered synchronously to every listener, at most once
    /// per incoming message.
    pub fn process_events(&mut self) {
        for event in self.provider.poll_events() {
            match event {
                DeviceEvent::Message { device_id, data } => self.on_message(&device_id, &data),
                DeviceEvent::Connected(_) | DeviceEvent::Disconnected { .. } => {
                    self.on_device_state_change(&event)
                }
            }
        }
    }

    fn on_message(&mut self, device_id: &str, data: &MidiData) {
        if !self
            .active_input
            .as_ref()
            .is_some_and(|active| active.id == device_id)
        {
            return;
        }

        if let Some(event) = NoteEvent::from_bytes(&data.bytes) {
            for (_, listener) in &mut self.listeners {
                listener(&event);
            }
        }
    }

    fn on_device_state_change(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::Disconnected { device_id } = event {
            if self
                .active_input
                .as_ref()
                .is_some_and(|active| &active.id == device_id)
            {
                log::info!("active midi device {device_id} disconnected");
                self.provider.disconnect_input();
                self.active_input = None;
            }
        }

        self.refresh_devices();
    }

    fn refresh_devices(&mut self) {
        self.devices = self.provider.list_input_devices().unwrap_or_else(|e| {
            log::error!("failed to list midi devices : {e}");
            vec![]
        });

        let Some(display) = self.display.clone() else {
            return;
        };

        let mut display = display.borrow_mut();
        display.clear_devices();

        for device in &self.devices {
            let label = if device.name.is_empty() {
                &device.id
            } else {
                &device.name
            };

            let is_active = self
                .active_input
                .as_ref()
                .is_some_and(|active| active.id == device.id);

            display.append_device(&device.id, label, is_active);
        }
    }

    fn ensure_granted(&self) -> Result<(), MonitorError> {
        match self.state {
            AccessState::AccessGranted => Ok(()),
            _ => Err(MonitorError::NotInitialized),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::display::DeviceList;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakeHost {
        granted: bool,
        devices: Vec<DeviceInfo>,
        queue: VecDeque<DeviceEvent>,
        connected: Option<String>,
        ops: Vec<String>,
    }

    impl FakeHost {
        fn granted_with(devices: &[(&str, &str)]) -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(Self {
                granted: true,
                devices: devices
                    .iter()
                    .map(|(id, name)| DeviceInfo {
                        id: (*id).to_owned(),
                        name: (*name).to_owned(),
                    })
                    .collect(),
                ..Self::default()
            }))
        }

        fn push_message(&mut self, device_id: &str, bytes: &[u8]) {
            self.queue.push_back(DeviceEvent::Message {
                device_id: device_id.to_owned(),
                data: MidiData {
                    timestamp: 0,
                    bytes: bytes.into(),
                },
            });
        }

        fn unplug(&mut self, device_id: &str) {
            self.devices.retain(|device| device.id != device_id);
            self.queue.push_back(DeviceEvent::Disconnected {
                device_id: device_id.to_owned(),
            });
        }
    }

    struct FakeProvider(Rc<RefCell<FakeHost>>);

    impl MidiInputProvider for FakeProvider {
        fn request_access(&mut self) -> anyhow::Result<()> {
            if !self.0.borrow().granted {
                anyhow::bail!("permission denied");
            }
            Ok(())
        }

        fn list_input_devices(&self) -> anyhow::Result<Vec<DeviceInfo>> {
            Ok(self.0.borrow().devices.clone())
        }

        fn connect_input(&mut self, device_id: &str) -> anyhow::Result<()> {
            let mut host = self.0.borrow_mut();
            host.connected = Some(device_id.to_owned());
            host.ops.push(format!("connect:{device_id}"));
            Ok(())
        }

        fn disconnect_input(&mut self) {
            let mut host = self.0.borrow_mut();
            host.connected = None;
            host.ops.push("disconnect".to_owned());
        }

        fn poll_events(&mut self) -> Vec<DeviceEvent> {
            self.0.borrow_mut().queue.drain(..).collect()
        }
    }

    fn monitor_for(host: &Rc<RefCell<FakeHost>>) -> InputMonitor {
        InputMonitor::new(Box::new(FakeProvider(host.clone())))
    }

    fn initialized(host: &Rc<RefCell<FakeHost>>) -> (InputMonitor, Rc<RefCell<DeviceList>>) {
        let mut monitor = monitor_for(host);
        let display = Rc::new(RefCell::new(DeviceList::new("select a midi input")));
        monitor.initialize(display.clone());
        (monitor, display)
    }

    fn recorded_notes(monitor: &mut InputMonitor) -> Rc<RefCell<Vec<NoteEvent>>> {
        let notes = Rc::new(RefCell::new(vec![]));
        let sink = notes.clone();
        monitor.subscribe(move |event| sink.borrow_mut().push(*event));
        notes
    }

    #[test]
    fn rejects_calls_before_initialization() {
        let host = FakeHost::granted_with(&[("d1", "Keyboard")]);
        let mut monitor = monitor_for(&host);

        assert!(matches!(
            monitor.list_inputs(),
            Err(MonitorError::NotInitialized)
        ));
        assert!(matches!(
            monitor.select_input("d1"),
            Err(MonitorError::NotInitialized)
        ));
    }

    #[test_log::test]
    fn denied_access_leaves_the_monitor_inert_until_reinitialized() {
        let host = FakeHost::granted_with(&[("d1", "Keyboard")]);
        host.borrow_mut().granted = false;

        let (mut monitor, display) = initialized(&host);
        assert_eq!(monitor.access_state(), AccessState::AccessDenied);
        assert!(monitor.list_inputs().is_err());
        assert!(monitor.active_input().is_none());
        assert!(display.borrow().options().is_empty());

        host.borrow_mut().granted = true;
        monitor.initialize(display.clone());
        assert_eq!(monitor.access_state(), AccessState::AccessGranted);
        assert_eq!(monitor.list_inputs().unwrap().len(), 1);
    }

    #[test]
    fn a_failed_reinitialize_leaves_no_stale_devices_behind() {
        let host = FakeHost::granted_with(&[("d1", "Keyboard")]);
        let (mut monitor, display) = initialized(&host);
        monitor.select_input("d1").unwrap();

        host.borrow_mut().granted = false;
        monitor.initialize(display.clone());

        assert_eq!(monitor.access_state(), AccessState::AccessDenied);
        assert!(monitor.active_input().is_none());
        assert!(host.borrow().connected.is_none());
        assert!(display.borrow().options().is_empty());
    }

    #[test]
    fn initialization_populates_the_display() {
        let host = FakeHost::granted_with(&[("d1", "Keyboard"), ("d2", "")]);
        let (monitor, display) = initialized(&host);

        assert_eq!(monitor.access_state(), AccessState::AccessGranted);

        let display = display.borrow();
        assert_eq!(display.placeholder(), "select a midi input");
        assert_eq!(display.options().len(), 2);
        assert_eq!(display.options()[0].label, "Keyboard");
        // nameless devices fall back to their id
        assert_eq!(display.options()[1].label, "d2");
        assert!(display.selected().is_none());
    }

    #[test]
    fn decodes_notes_from_the_selected_device() {
        let host = FakeHost::granted_with(&[("d1", "Keyboard")]);
        let (mut monitor, _display) = initialized(&host);
        let notes = recorded_notes(&mut monitor);

        monitor.select_input("d1").unwrap();
        assert_eq!(monitor.active_input().unwrap().id, "d1");

        {
            let mut host = host.borrow_mut();
            host.push_message("d1", &[0x90, 60, 100]);
            host.push_message("d1", &[0x80, 60, 0]);
            host.push_message("d1", &[0x90, 60, 0]);
        }
        monitor.process_events();

        assert_eq!(
            *notes.borrow(),
            vec![
                NoteEvent::NoteOn {
                    note: 60,
                    velocity: 100
                },
                NoteEvent::NoteOff {
                    note: 60,
                    velocity: 0
                },
            ]
        );
    }

    #[test]
    fn selecting_an_unknown_device_clears_the_active_input() {
        let host = FakeHost::granted_with(&[("d1", "Keyboard")]);
        let (mut monitor, _display) = initialized(&host);
        let notes = recorded_notes(&mut monitor);

        monitor.select_input("d1").unwrap();
        monitor.select_input("not-a-device").unwrap();
        assert!(monitor.active_input().is_none());
        assert!(host.borrow().connected.is_none());

        // idempotent
        monitor.select_input("not-a-device").unwrap();
        assert!(monitor.active_input().is_none());

        host.borrow_mut().push_message("d1", &[0x90, 60, 100]);
        monitor.process_events();
        assert!(notes.borrow().is_empty());
    }

    #[test]
    fn switching_devices_detaches_before_attaching() {
        let host = FakeHost::granted_with(&[("d1", "Keyboard"), ("d2", "Drum Pad")]);
        let (mut monitor, _display) = initialized(&host);
        let notes = recorded_notes(&mut monitor);

        monitor.select_input("d1").unwrap();
        monitor.select_input("d2").unwrap();

        assert_eq!(
            host.borrow().ops,
            vec!["disconnect", "connect:d1", "disconnect", "connect:d2"]
        );

        {
            let mut host = host.borrow_mut();
            host.push_message("d1", &[0x90, 60, 100]);
            host.push_message("d2", &[0x90, 72, 50]);
        }
        monitor.process_events();

        // stale traffic from the previous device is discarded
        assert_eq!(
            *notes.borrow(),
            vec![NoteEvent::NoteOn {
                note: 72,
                velocity: 50
            }]
        );
    }

    #[test]
    fn disconnecting_the_active_device_clears_it() {
        let host = FakeHost::granted_with(&[("d1", "Keyboard"), ("d2", "Drum Pad")]);
        let (mut monitor, display) = initialized(&host);

        monitor.select_input("d1").unwrap();
        host.borrow_mut().unplug("d1");
        monitor.process_events();

        assert!(monitor.active_input().is_none());
        assert!(host.borrow().connected.is_none());
        assert_eq!(monitor.list_inputs().unwrap().len(), 1);

        let display = display.borrow();
        assert_eq!(display.options().len(), 1);
        assert_eq!(display.options()[0].id, "d2");
    }

    #[test]
    fn disconnecting_another_device_preserves_the_selection() {
        let host = FakeHost::granted_with(&[("d1", "Keyboard"), ("d2", "Drum Pad")]);
        let (mut monitor, display) = initialized(&host);

        monitor.select_input("d1").unwrap();
        host.borrow_mut().unplug("d2");
        monitor.process_events();

        assert_eq!(monitor.active_input().unwrap().id, "d1");
        assert_eq!(display.borrow().selected().unwrap().id, "d1");
    }

    #[test]
    fn hotplugged_devices_show_up_in_the_display() {
        let host = FakeHost::granted_with(&[("d1", "Keyboard")]);
        let (mut monitor, display) = initialized(&host);

        {
            let mut host = host.borrow_mut();
            let device = DeviceInfo {
                id: "d2".to_owned(),
                name: "Drum Pad".to_owned(),
            };
            host.devices.push(device.clone());
            host.queue.push_back(DeviceEvent::Connected(device));
        }
        monitor.process_events();

        assert_eq!(monitor.list_inputs().unwrap().len(), 2);
        assert_eq!(display.borrow().options().len(), 2);
    }

    #[test]
    fn unsubscribed_listeners_receive_nothing_further() {
        let host = FakeHost::granted_with(&[("d1", "Keyboard")]);
        let (mut monitor, _display) = initialized(&host);

        let notes = recorded_notes(&mut monitor);
        let kept = Rc::new(RefCell::new(vec![]));
        let sink = kept.clone();
        monitor.subscribe(move |event| sink.borrow_mut().push(*event));

        monitor.select_input("d1").unwrap();
        host.borrow_mut().push_message("d1", &[0x90, 60, 100]);
        monitor.process_events();

        monitor.unsubscribe(ListenerId(0));
        host.borrow_mut().push_message("d1", &[0x80, 60, 0]);
        monitor.process_events();

        assert_eq!(notes.borrow().len(), 1);
        assert_eq!(kept.borrow().len(), 2);
    }
}
