//! Byte sources that feed the decoders.
//!
//! The decoders consume plain byte slices and do no I/O of their own. This
//! crate supplies the two sources the system uses: recorded pcap images
//! ([`pcap::PcapReader`]) and live sockets ([`udp::UdpReceiver`]). Both
//! hand over UDP payload bytes only; link and IP headers never reach the
//! core.

pub mod pcap;
pub mod udp;

pub use pcap::{Packet, PcapReader};
pub use udp::UdpReceiver;
