//! Art-Net UDP bridge: folds merged per-fixture attribute bundles into
//! DMX512 universe buffers and broadcasts one ArtDmx packet per touched
//! universe.

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Mutex;

use log::warn;

use crate::entity::{EntityRegistry, Fixture, FixtureId, FixtureModel};
use crate::value::AttributeBundle;

const ART_NET_HEADER: &[u8; 8] = b"Art-Net\0";
const OP_CODE_DMX: u16 = 0x5000;
const PROTOCOL_VERSION: u16 = 14;
pub const ART_NET_PORT: u16 = 6454;

struct UniverseState {
    dmx: [u8; 512],
    /// The last emitted sequence number; 0 means none sent yet. Wraps
    /// 1..255, never emitting the reserved "disabled" value 0.
    sequence: u8,
}

impl UniverseState {
    fn new() -> Self {
        Self {
            dmx: [0u8; 512],
            sequence: 0,
        }
    }

    fn next_sequence(&mut self) -> u8 {
        self.sequence = if self.sequence >= 255 { 1 } else { self.sequence + 1 };
        self.sequence
    }
}

/// Owns one UDP socket bound with `SO_BROADCAST` and the lazily-created
/// per-universe DMX buffers. Invoked only from the engine's tick thread.
pub struct ArtNetBridge {
    socket: UdpSocket,
    broadcast_addr: SocketAddr,
    universes: Mutex<HashMap<u16, UniverseState>>,
}

impl ArtNetBridge {
    pub fn new(broadcast_addr: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_broadcast(true)?;
        Ok(Self {
            socket,
            broadcast_addr,
            universes: Mutex::new(HashMap::new()),
        })
    }

    pub fn default_broadcast_addr() -> SocketAddr {
        SocketAddr::from(([2, 255, 255, 255], ART_NET_PORT))
    }

    /// Applies one merged frame to the DMX buffers and sends one ArtDmx
    /// packet per universe touched by a fixture in `fixtures`.
    pub fn send_frame(&self, fixtures: &HashMap<FixtureId, AttributeBundle>, registry: &dyn EntityRegistry) {
        let mut universes = self.universes.lock().unwrap();
        let mut touched: Vec<u16> = Vec::new();

        for (fixture_id, bundle) in fixtures {
            let Some(fixture) = registry.get_fixture(&fixture_id.0) else {
                continue;
            };
            let Some(model) = registry.get_fixture_model(&fixture.model_id.0) else {
                continue;
            };
            if !touched.contains(&fixture.universe) {
                touched.push(fixture.universe);
            }
            let state = universes.entry(fixture.universe).or_insert_with(UniverseState::new);
            write_fixture(state, &fixture, &model, bundle);
        }

        for universe in touched {
            if let Some(state) = universes.get_mut(&universe) {
                self.send_universe(universe, state);
            }
        }
    }

    fn send_universe(&self, universe: u16, state: &mut UniverseState) {
        let sequence = state.next_sequence();
        let packet = build_packet(universe, sequence, &state.dmx);
        if let Err(e) = self.socket.send_to(&packet, self.broadcast_addr) {
            warn!("Art-Net send failed for universe {universe}: {e}");
        }
    }

    /// Zeroes and re-sends every universe that has ever been touched, for a
    /// clean blackout on shutdown.
    pub fn blackout(&self) {
        let mut universes = self.universes.lock().unwrap();
        for (&universe, state) in universes.iter_mut() {
            state.dmx = [0u8; 512];
            self.send_universe(universe, state);
        }
    }
}

fn write_fixture(state: &mut UniverseState, fixture: &Fixture, model: &FixtureModel, bundle: &AttributeBundle) {
    let mut write_channel = |name: &str, v: u8| {
        if let Some(&offset) = model.channels.get(name) {
            let index = fixture.start_channel as i32 + offset as i32 - 2;
            if (0..512).contains(&index) {
                state.dmx[index as usize] = v;
            }
        }
    };

    if let Some(intensity) = bundle.intensity {
        write_channel("dimmer", unit_to_u8(intensity.val()));
    }
    if let Some(r) = bundle.color.r {
        write_channel("red", unit_to_u8(r.val()));
    }
    if let Some(g) = bundle.color.g {
        write_channel("green", unit_to_u8(g.val()));
    }
    if let Some(b) = bundle.color.b {
        write_channel("blue", unit_to_u8(b.val()));
    }
    if model.channels.contains_key("white") {
        if let (Some(r), Some(g), Some(b)) = (bundle.color.r, bundle.color.g, bundle.color.b) {
            let white = r.val().min(g.val()).min(b.val());
            write_channel("white", unit_to_u8(white));
        }
    }
    if let Some(zoom) = bundle.zoom {
        write_channel("zoom", unit_to_u8(zoom.val()));
    }
    if let Some(pan) = bundle.pan {
        write_channel("pan", bipolar_to_u8(pan.val()));
        write_channel("panFine", 0);
    }
    if let Some(tilt) = bundle.tilt {
        write_channel("tilt", bipolar_to_u8(tilt.val()));
        write_channel("tiltFine", 0);
    }
}

fn unit_to_u8(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn bipolar_to_u8(v: f64) -> u8 {
    (((v.clamp(-1.0, 1.0) + 1.0) / 2.0) * 255.0).round() as u8
}

fn build_packet(universe: u16, sequence: u8, dmx: &[u8; 512]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(18 + 512);
    packet.extend_from_slice(ART_NET_HEADER);
    packet.extend_from_slice(&OP_CODE_DMX.to_le_bytes());
    packet.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    packet.push(sequence);
    packet.push(0); // physical port, unused
    packet.push((universe & 0xFF) as u8);
    packet.push(((universe >> 8) & 0x7F) as u8);
    packet.extend_from_slice(&512u16.to_be_bytes());
    packet.extend_from_slice(dmx);
    packet
}
