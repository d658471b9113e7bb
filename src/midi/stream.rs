use super::*;
use crossbeam::channel::{Receiver, Sender};
use midir::*;

const CLIENT_NAME: &str = "notemon-midi-in";

/// What a platform MIDI host hands back to the monitor: raw messages
/// tagged with their source device, and hot-plug transitions.
#[derive(Debug)]
pub enum DeviceEvent {
    Message { device_id: String, data: MidiData },
    Connected(DeviceInfo),
    Disconnected { device_id: String },
}

/// Platform access provider seam. `request_access` is a single-shot
/// operation that suspends the caller until the platform grants or
/// denies access; everything else is non-blocking.
pub trait MidiInputProvider {
    fn request_access(&mut self) -> anyhow::Result<()>;
    fn list_input_devices(&self) -> anyhow::Result<Vec<DeviceInfo>>;
    fn connect_input(&mut self, device_id: &str) -> anyhow::Result<()>;
    fn disconnect_input(&mut self);
    fn poll_events(&mut self) -> Vec<DeviceEvent>;
}

pub struct HostedMidiInput {
    host: Option<MidiInput>,
    sender: Sender<DeviceEvent>,
    receiver: Receiver<DeviceEvent>,
    connection: Option<MidiInputConnection<Sender<DeviceEvent>>>,
    known_devices: Vec<DeviceInfo>,
}

impl Default for HostedMidiInput {
    fn default() -> Self {
        let (sender, receiver) = crossbeam::channel::bounded(1_000);

        Self {
            host: None,
            sender,
            receiver,
            connection: None,
            known_devices: vec![],
        }
    }
}

impl MidiInputProvider for HostedMidiInput {
    fn request_access(&mut self) -> anyhow::Result<()> {
        let host = MidiInput::new(CLIENT_NAME)?;
        self.known_devices = list_devices(&host);
        self.host = Some(host);
        Ok(())
    }

    fn list_input_devices(&self) -> anyhow::Result<Vec<DeviceInfo>> {
        let Some(host) = self.host.as_ref() else {
            anyhow::bail!("[ MIDI ] : access has not been requested");
        };

        Ok(list_devices(host))
    }

    fn connect_input(&mut self, device_id: &str) -> anyhow::Result<()> {
        self.disconnect_input();

        let Some(host) = self.host.as_ref() else {
            anyhow::bail!("[ MIDI ] : access has not been requested");
        };

        let ports = host.ports();
        let port = ports
            .iter()
            .find(|port| port.id() == device_id)
            .ok_or_else(|| anyhow::anyhow!("[ MIDI ] : Cannot find device {device_id}"))?;

        self.connection = Some(self.connect_to_input_port(port, device_id)?);
        log::trace!("[ MIDI ] : connected to {device_id}");
        Ok(())
    }

    fn disconnect_input(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
    }

    fn poll_events(&mut self) -> Vec<DeviceEvent> {
        let mut events = self.poll_hotplug_transitions();
        events.extend(self.receiver.try_iter());
        events
    }
}

impl HostedMidiInput {
    fn connect_to_input_port(
        &self,
        port: &MidiInputPort,
        device_id: &str,
    ) -> anyhow::Result<MidiInputConnection<Sender<DeviceEvent>>> {
        let callback = {
            let device_id = device_id.to_owned();

            move |timestamp: u64, bytes: &[u8], sender: &mut Sender<DeviceEvent>| {
                let event = DeviceEvent::Message {
                    device_id: device_id.clone(),
                    data: MidiData {
                        timestamp,
                        bytes: bytes.into(),
                    },
                };

                if let Err(e) = sender.try_send(event) {
                    log::error!("Failed to push midi message event to monitor : {e}");
                }
            }
        };

        MidiInput::new(CLIENT_NAME)?
            .connect(port, CLIENT_NAME, callback, self.sender.clone())
            .map_err(|e| anyhow::anyhow!(e.to_string()))
    }

    // midir has no state-change callback, so hot-plug transitions are
    // synthesized by diffing the port list on each poll.
    fn poll_hotplug_transitions(&mut self) -> Vec<DeviceEvent> {
        let Some(host) = self.host.as_ref() else {
            return vec![];
        };

        let current = list_devices(host);
        let transitions = diff_devices(&self.known_devices, &current);
        self.known_devices = current;
        transitions
    }
}

fn list_devices(host: &MidiInput) -> Vec<DeviceInfo> {
    host.ports()
        .iter()
        .map(|port| DeviceInfo {
            id: port.id(),
            name: host.port_name(port).unwrap_or_default(),
        })
        .collect()
}

fn diff_devices(known: &[DeviceInfo], current: &[DeviceInfo]) -> Vec<DeviceEvent> {
    let mut events: Vec<DeviceEvent> = known
        .iter()
        .filter(|device| !current.iter().any(|other| other.id == device.id))
        .map(|device| DeviceEvent::Disconnected {
            device_id: device.id.clone(),
        })
        .collect();

    events.extend(
        current
            .iter()
            .filter(|device| !known.iter().any(|other| other.id == device.id))
            .map(|device| DeviceEvent::Connected(device.clone())),
    );

    events
}
