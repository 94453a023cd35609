//! pcap file-image reader.
//!
//! Walks a classic pcap byte image (either byte order, microsecond or
//! nanosecond timestamps), filters Ethernet → IPv4 → UDP, and yields UDP
//! payloads with their capture timestamps. Anything that is not a
//! well-formed UDP-over-IPv4-over-Ethernet packet is skipped; a torn
//! trailing record ends iteration.

const FILE_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;
const ETHERNET_LEN: usize = 14;
const UDP_HEADER_LEN: usize = 8;

const MAGIC_USEC: u32 = 0xa1b2_c3d4;
const MAGIC_USEC_SWAPPED: u32 = 0xd4c3_b2a1;
const MAGIC_NSEC: u32 = 0xa1b2_3c4d;
const MAGIC_NSEC_SWAPPED: u32 = 0x4d3c_b2a1;

const ETHERTYPE_IPV4: u16 = 0x0800;
const IPPROTO_UDP: u8 = 17;

/// One captured UDP datagram.
#[derive(Clone, Copy, Debug)]
pub struct Packet<'a> {
    pub timestamp_ns: u64,
    pub payload: &'a [u8],
    pub src_port: u16,
    pub dst_port: u16,
}

/// Iterator-style reader over an in-memory pcap image.
pub struct PcapReader<'a> {
    data: &'a [u8],
    offset: usize,
    /// File fields are big-endian relative to this host.
    swapped: bool,
    /// Sub-second timestamp field is nanoseconds, not microseconds.
    nanos: bool,
    valid: bool,
    packets_read: usize,
}

impl<'a> PcapReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut reader = Self {
            data,
            offset: FILE_HEADER_LEN,
            swapped: false,
            nanos: false,
            valid: false,
            packets_read: 0,
        };

        if data.len() < FILE_HEADER_LEN {
            return reader;
        }
        match u32::from_le_bytes([data[0], data[1], data[2], data[3]]) {
            MAGIC_USEC => {
                reader.valid = true;
            }
            MAGIC_NSEC => {
                reader.valid = true;
                reader.nanos = true;
            }
            MAGIC_USEC_SWAPPED => {
                reader.valid = true;
                reader.swapped = true;
            }
            MAGIC_NSEC_SWAPPED => {
                reader.valid = true;
                reader.swapped = true;
                reader.nanos = true;
            }
            _ => {}
        }
        reader
    }

    /// Magic matched one of the four pcap variants.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn packets_read(&self) -> usize {
        self.packets_read
    }

    pub fn reset(&mut self) {
        self.offset = FILE_HEADER_LEN;
        self.packets_read = 0;
    }

    /// Next UDP payload, or `None` at end of image.
    pub fn next_packet(&mut self) -> Option<Packet<'a>> {
        if !self.valid {
            return None;
        }

        loop {
            if self.data.len() - self.offset < RECORD_HEADER_LEN {
                return None;
            }

            let ts_sec = self.u32_at(self.offset);
            let ts_frac = self.u32_at(self.offset + 4);
            let incl_len = self.u32_at(self.offset + 8) as usize;

            let frame_start = self.offset + RECORD_HEADER_LEN;
            let frame_end = frame_start + incl_len;
            if frame_end > self.data.len() {
                // Torn trailing record.
                return None;
            }
            self.offset = frame_end;

            if let Some(packet) = self.parse_frame(ts_sec, ts_frac, frame_start, incl_len) {
                self.packets_read += 1;
                return Some(packet);
            }
        }
    }

    fn parse_frame(
        &self,
        ts_sec: u32,
        ts_frac: u32,
        start: usize,
        len: usize,
    ) -> Option<Packet<'a>> {
        if len < ETHERNET_LEN {
            return None;
        }
        let frame = &self.data[start..start + len];

        // Network headers are big-endian regardless of the file byte order.
        let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
        if ethertype != ETHERTYPE_IPV4 {
            return None;
        }

        let ip = &frame[ETHERNET_LEN..];
        if ip.len() < 20 {
            return None;
        }
        let version = ip[0] >> 4;
        let ihl = ((ip[0] & 0x0F) as usize) * 4;
        if version != 4 || ihl < 20 || ip.len() < ihl {
            return None;
        }
        if ip[9] != IPPROTO_UDP {
            return None;
        }

        let udp = &ip[ihl..];
        if udp.len() < UDP_HEADER_LEN {
            return None;
        }
        let src_port = u16::from_be_bytes([udp[0], udp[1]]);
        let dst_port = u16::from_be_bytes([udp[2], udp[3]]);
        let udp_len = u16::from_be_bytes([udp[4], udp[5]]) as usize;
        if udp_len < UDP_HEADER_LEN || udp.len() < udp_len {
            return None;
        }

        let frac_ns = if self.nanos {
            ts_frac as u64
        } else {
            ts_frac as u64 * 1_000
        };

        Some(Packet {
            timestamp_ns: ts_sec as u64 * 1_000_000_000 + frac_ns,
            payload: &udp[UDP_HEADER_LEN..udp_len],
            src_port,
            dst_port,
        })
    }

    fn u32_at(&self, offset: usize) -> u32 {
        let bytes = [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ];
        if self.swapped {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_header(magic: u32, le: bool) -> Vec<u8> {
        let mut out = Vec::new();
        let push32 = |out: &mut Vec<u8>, v: u32| {
            if le {
                out.extend_from_slice(&v.to_le_bytes());
            } else {
                out.extend_from_slice(&v.to_be_bytes());
            }
        };
        // The magic bytes themselves fix the byte order; write them LE so
        // `magic` is interpreted as given.
        out.extend_from_slice(&magic.to_le_bytes());
        if le {
            out.extend_from_slice(&2u16.to_le_bytes());
            out.extend_from_slice(&4u16.to_le_bytes());
        } else {
            out.extend_from_slice(&2u16.to_be_bytes());
            out.extend_from_slice(&4u16.to_be_bytes());
        }
        push32(&mut out, 0); // thiszone
        push32(&mut out, 0); // sigfigs
        push32(&mut out, 65_535); // snaplen
        push32(&mut out, 1); // LINKTYPE_ETHERNET
        out
    }

    fn udp_frame(payload: &[u8], src_port: u16, dst_port: u16) -> Vec<u8> {
        let mut frame = Vec::new();
        // Ethernet
        frame.extend_from_slice(&[0x02; 6]);
        frame.extend_from_slice(&[0x04; 6]);
        frame.extend_from_slice(&0x0800u16.to_be_bytes());
        // IPv4, no options
        let total_len = 20 + 8 + payload.len() as u16;
        frame.push(0x45);
        frame.push(0);
        frame.extend_from_slice(&total_len.to_be_bytes());
        frame.extend_from_slice(&[0; 4]); // id, flags/frag
        frame.push(64); // ttl
        frame.push(17); // UDP
        frame.extend_from_slice(&[0; 2]); // checksum
        frame.extend_from_slice(&[10, 0, 0, 1]);
        frame.extend_from_slice(&[10, 0, 0, 2]);
        // UDP
        frame.extend_from_slice(&src_port.to_be_bytes());
        frame.extend_from_slice(&dst_port.to_be_bytes());
        frame.extend_from_slice(&(8 + payload.len() as u16).to_be_bytes());
        frame.extend_from_slice(&[0; 2]);
        frame.extend_from_slice(payload);
        frame
    }

    fn record(image: &mut Vec<u8>, le: bool, ts_sec: u32, ts_frac: u32, frame: &[u8]) {
        let push32 = |out: &mut Vec<u8>, v: u32| {
            if le {
                out.extend_from_slice(&v.to_le_bytes());
            } else {
                out.extend_from_slice(&v.to_be_bytes());
            }
        };
        push32(image, ts_sec);
        push32(image, ts_frac);
        push32(image, frame.len() as u32);
        push32(image, frame.len() as u32);
        image.extend_from_slice(frame);
    }

    #[test]
    fn extracts_udp_payloads() {
        let mut image = file_header(MAGIC_USEC, true);
        record(
            &mut image,
            true,
            7,
            250,
            &udp_frame(b"HELLO", 9000, 26400),
        );

        let mut reader = PcapReader::new(&image);
        assert!(reader.is_valid());

        let packet = reader.next_packet().unwrap();
        assert_eq!(packet.payload, b"HELLO");
        assert_eq!(packet.src_port, 9000);
        assert_eq!(packet.dst_port, 26400);
        assert_eq!(packet.timestamp_ns, 7_000_000_000 + 250_000);

        assert!(reader.next_packet().is_none());
        assert_eq!(reader.packets_read(), 1);
    }

    #[test]
    fn nanosecond_magic_keeps_fraction_as_is() {
        let mut image = file_header(MAGIC_NSEC, true);
        record(&mut image, true, 1, 999, &udp_frame(b"X", 1, 2));

        let mut reader = PcapReader::new(&image);
        let packet = reader.next_packet().unwrap();
        assert_eq!(packet.timestamp_ns, 1_000_000_000 + 999);
    }

    #[test]
    fn big_endian_image_is_understood() {
        // A BE writer stores the usec magic in its own order; reading the
        // first four bytes LE yields the swapped constant.
        let mut image = file_header(MAGIC_USEC_SWAPPED, false);
        record(&mut image, false, 3, 5, &udp_frame(b"BE", 10, 20));

        let mut reader = PcapReader::new(&image);
        assert!(reader.is_valid());
        let packet = reader.next_packet().unwrap();
        assert_eq!(packet.payload, b"BE");
        assert_eq!(packet.timestamp_ns, 3_000_000_000 + 5_000);
    }

    #[test]
    fn non_udp_frames_are_skipped() {
        let mut image = file_header(MAGIC_USEC, true);

        // ARP frame: wrong ethertype.
        let mut arp = Vec::new();
        arp.extend_from_slice(&[0u8; 12]);
        arp.extend_from_slice(&0x0806u16.to_be_bytes());
        arp.extend_from_slice(&[0u8; 28]);
        record(&mut image, true, 1, 0, &arp);

        record(&mut image, true, 2, 0, &udp_frame(b"KEEP", 5, 6));

        let mut reader = PcapReader::new(&image);
        let packet = reader.next_packet().unwrap();
        assert_eq!(packet.payload, b"KEEP");
        assert_eq!(reader.packets_read(), 1);
    }

    #[test]
    fn bad_magic_is_invalid() {
        let image = [0u8; 32];
        let mut reader = PcapReader::new(&image);
        assert!(!reader.is_valid());
        assert!(reader.next_packet().is_none());
    }

    #[test]
    fn torn_trailing_record_ends_iteration() {
        let mut image = file_header(MAGIC_USEC, true);
        record(&mut image, true, 1, 0, &udp_frame(b"OK", 1, 2));
        // A record header promising more bytes than remain.
        image.extend_from_slice(&1u32.to_le_bytes());
        image.extend_from_slice(&0u32.to_le_bytes());
        image.extend_from_slice(&500u32.to_le_bytes());
        image.extend_from_slice(&500u32.to_le_bytes());
        image.extend_from_slice(&[0u8; 10]);

        let mut reader = PcapReader::new(&image);
        assert!(reader.next_packet().is_some());
        assert!(reader.next_packet().is_none());
    }

    #[test]
    fn reset_restarts_iteration() {
        let mut image = file_header(MAGIC_USEC, true);
        record(&mut image, true, 1, 0, &udp_frame(b"A", 1, 2));

        let mut reader = PcapReader::new(&image);
        assert!(reader.next_packet().is_some());
        reader.reset();
        assert_eq!(reader.packets_read(), 0);
        assert!(reader.next_packet().is_some());
    }
}
