// Simulated campus-mesh signal layer: peer visibility and connectivity.

pub mod monitor;
pub mod peers;

pub use monitor::{spawn_monitor, LinkSignal, LinkSnapshot, LinkUpdate};
pub use peers::{MeshPeer, PeerRoster};
