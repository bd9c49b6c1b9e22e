//! Fixed, versioned, little-endian wire types for the exchange and
//! distribution protocols.
//!
//! Face descriptors are encoded field by field with [`bytes`], so the wire
//! layout never depends on how a Rust struct happens to be laid out in memory.
//! Small fixed headers stay `bytemuck::Pod` with pre-swapped LE fields.

use crate::mesh_error::MeshConnectError;
use crate::topology::lonely_face::{LonelyFace, RemoteNeighbor};
use crate::topology::triangle::NFACES;
use bytemuck::{Pod, Zeroable};
use bytes::{Buf, BufMut, BytesMut};
use static_assertions::{assert_eq_size, const_assert_eq};

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), MeshConnectError> {
    if actual == expected {
        Ok(())
    } else {
        Err(MeshConnectError::ProtocolViolation(format!(
            "expected {expected} bytes, got {actual}"
        )))
    }
}

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32, // count of following records
}
impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// Status carried in [`WireDistHdr`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DistStatus {
    Ok,
    Abort,
}

/// First message of every root → rank distribution: status and element count.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireDistHdr {
    pub version_le: u16,
    pub status_le: u16, // 0 = ok, 1 = abort
    pub count_le: u32,  // elements that follow
}

impl WireDistHdr {
    pub fn new(status: DistStatus, count: u32) -> Self {
        let status = match status {
            DistStatus::Ok => 0u16,
            DistStatus::Abort => 1u16,
        };
        Self {
            version_le: WIRE_VERSION.to_le(),
            status_le: status.to_le(),
            count_le: count.to_le(),
        }
    }

    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }

    pub fn status(&self) -> Result<DistStatus, MeshConnectError> {
        match u16::from_le(self.status_le) {
            0 => Ok(DistStatus::Ok),
            1 => Ok(DistStatus::Abort),
            other => Err(MeshConnectError::ProtocolViolation(format!(
                "unknown distribution status {other}"
            ))),
        }
    }

    pub fn count(&self) -> usize {
        u32::from_le(self.count_le) as usize
    }

    /// Decodes a received header, checking length and version.
    pub fn decode(bytes: &[u8]) -> Result<Self, MeshConnectError> {
        expect_exact_len(bytes.len(), std::mem::size_of::<Self>())?;
        let hdr: Self = bytemuck::pod_read_unaligned(bytes);
        if hdr.version() != WIRE_VERSION {
            return Err(MeshConnectError::ProtocolViolation(format!(
                "wire version {} does not match {WIRE_VERSION}",
                hdr.version()
            )));
        }
        Ok(hdr)
    }
}

// ===== Lonely face records ==================================================
//
// offset  width  field
//      0      4  element
//      4      4  face
//      8      8  v1
//     16      8  v2
//     24      4  rank (discovering rank)
//     28      4  flags (bit 0: neighbor present, bit 1: closed locally)
//     32      4  neighbor element
//     36      4  neighbor face
//     40      4  neighbor rank
//     44      4  reserved, zero

pub const LONELY_FACE_WIRE_SIZE: usize = 48;
const FLAG_HAS_NEIGHBOR: u32 = 1;
const FLAG_LOCALLY_CLOSED: u32 = 2;

const_assert_eq!(LONELY_FACE_WIRE_SIZE, 4 + 4 + 8 + 8 + 4 + 4 + 4 + 4 + 4 + 4);
assert_eq_size!(WireCount, u32);
assert_eq_size!(WireDistHdr, u64);

fn narrow(field: &str, v: usize) -> Result<u32, MeshConnectError> {
    u32::try_from(v).map_err(|_| {
        MeshConnectError::ProtocolViolation(format!("{field} {v} does not fit the 32-bit wire field"))
    })
}

/// Appends one descriptor in wire order.
pub fn put_lonely_face(buf: &mut BytesMut, face: &LonelyFace) -> Result<(), MeshConnectError> {
    buf.put_u32_le(narrow("element", face.element)?);
    buf.put_u32_le(narrow("face", face.face)?);
    buf.put_u64_le(face.v1);
    buf.put_u64_le(face.v2);
    buf.put_u32_le(narrow("rank", face.rank)?);
    let closed = if face.locally_closed { FLAG_LOCALLY_CLOSED } else { 0 };
    match face.neighbor {
        Some(n) => {
            buf.put_u32_le(FLAG_HAS_NEIGHBOR | closed);
            buf.put_u32_le(narrow("neighbor element", n.element)?);
            buf.put_u32_le(narrow("neighbor face", n.face)?);
            buf.put_u32_le(narrow("neighbor rank", n.rank)?);
        }
        None => {
            buf.put_u32_le(closed);
            buf.put_u32_le(0);
            buf.put_u32_le(0);
            buf.put_u32_le(0);
        }
    }
    buf.put_u32_le(0);
    Ok(())
}

/// Reads one descriptor; `buf` must hold at least [`LONELY_FACE_WIRE_SIZE`] bytes.
fn get_lonely_face(buf: &mut &[u8]) -> Result<LonelyFace, MeshConnectError> {
    let element = buf.get_u32_le() as usize;
    let face = buf.get_u32_le() as usize;
    let v1 = buf.get_u64_le();
    let v2 = buf.get_u64_le();
    let rank = buf.get_u32_le() as usize;
    let flags = buf.get_u32_le();
    let n_element = buf.get_u32_le() as usize;
    let n_face = buf.get_u32_le() as usize;
    let n_rank = buf.get_u32_le() as usize;
    let _reserved = buf.get_u32_le();

    if face >= NFACES {
        return Err(MeshConnectError::ProtocolViolation(format!(
            "descriptor for element {element} names face {face}"
        )));
    }
    let neighbor = match flags {
        0 | FLAG_LOCALLY_CLOSED => None,
        FLAG_HAS_NEIGHBOR if n_face < NFACES => Some(RemoteNeighbor {
            rank: n_rank,
            element: n_element,
            face: n_face,
        }),
        FLAG_HAS_NEIGHBOR => {
            return Err(MeshConnectError::ProtocolViolation(format!(
                "descriptor for element {element} names neighbor face {n_face}"
            )));
        }
        other => {
            return Err(MeshConnectError::ProtocolViolation(format!(
                "unknown descriptor flags {other:#x}"
            )));
        }
    };
    Ok(LonelyFace {
        element,
        face,
        v1,
        v2,
        rank,
        neighbor,
        locally_closed: flags == FLAG_LOCALLY_CLOSED,
    })
}

/// Decodes a packed run of descriptors.
pub fn decode_lonely_faces(mut bytes: &[u8]) -> Result<Vec<LonelyFace>, MeshConnectError> {
    if bytes.len() % LONELY_FACE_WIRE_SIZE != 0 {
        return Err(MeshConnectError::ProtocolViolation(format!(
            "{} bytes is not a whole number of {LONELY_FACE_WIRE_SIZE}-byte descriptors",
            bytes.len()
        )));
    }
    let mut out = Vec::with_capacity(bytes.len() / LONELY_FACE_WIRE_SIZE);
    while bytes.has_remaining() {
        out.push(get_lonely_face(&mut bytes)?);
    }
    Ok(out)
}

// ===== Scalar arrays ========================================================

/// Fixed-width little-endian scalar for distribution payloads.
pub trait WireScalar: Copy + Sized {
    const WIDTH: usize;
    fn put(self, buf: &mut BytesMut);
    fn get(buf: &mut &[u8]) -> Self;
}

impl WireScalar for f64 {
    const WIDTH: usize = 8;
    fn put(self, buf: &mut BytesMut) {
        buf.put_f64_le(self);
    }
    fn get(buf: &mut &[u8]) -> Self {
        buf.get_f64_le()
    }
}

impl WireScalar for i32 {
    const WIDTH: usize = 4;
    fn put(self, buf: &mut BytesMut) {
        buf.put_i32_le(self);
    }
    fn get(buf: &mut &[u8]) -> Self {
        buf.get_i32_le()
    }
}

impl WireScalar for u64 {
    const WIDTH: usize = 8;
    fn put(self, buf: &mut BytesMut) {
        buf.put_u64_le(self);
    }
    fn get(buf: &mut &[u8]) -> Self {
        buf.get_u64_le()
    }
}

pub fn encode_array<T: WireScalar>(values: &[T]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(values.len() * T::WIDTH);
    for &v in values {
        v.put(&mut buf);
    }
    buf
}

/// Decodes exactly `n` scalars; any other length is a protocol violation.
pub fn decode_array<T: WireScalar>(mut bytes: &[u8], n: usize) -> Result<Vec<T>, MeshConnectError> {
    expect_exact_len(bytes.len(), n * T::WIDTH)?;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(T::get(&mut bytes));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LonelyFace {
        LonelyFace {
            element: 12,
            face: 2,
            v1: 7,
            v2: 1 << 40,
            rank: 3,
            neighbor: Some(RemoteNeighbor {
                rank: 1,
                element: 99,
                face: 0,
            }),
            locally_closed: false,
        }
    }

    #[test]
    fn record_layout_is_fixed() {
        let mut buf = BytesMut::new();
        put_lonely_face(&mut buf, &sample()).unwrap();
        assert_eq!(buf.len(), LONELY_FACE_WIRE_SIZE);
        assert_eq!(&buf[0..4], &12u32.to_le_bytes());
        assert_eq!(&buf[16..24], &(1u64 << 40).to_le_bytes());
        assert_eq!(&buf[28..32], &1u32.to_le_bytes());
        assert_eq!(&buf[44..48], &[0; 4]);
        assert_eq!(decode_lonely_faces(&buf).unwrap(), vec![sample()]);
    }

    #[test]
    fn unresolved_record_has_no_neighbor() {
        let f = LonelyFace::new(0, 1, 4, 7, 0);
        let mut buf = BytesMut::new();
        put_lonely_face(&mut buf, &f).unwrap();
        assert_eq!(decode_lonely_faces(&buf).unwrap()[0].neighbor, None);
    }

    #[test]
    fn closed_marker_sets_its_own_flag() {
        let marker = LonelyFace::closed_marker(3, 1, 0, 1, 2);
        let mut buf = BytesMut::new();
        put_lonely_face(&mut buf, &marker).unwrap();
        assert_eq!(&buf[28..32], &2u32.to_le_bytes());
        assert_eq!(decode_lonely_faces(&buf).unwrap(), vec![marker]);

        // a marker never carries a partner
        buf[28..32].copy_from_slice(&3u32.to_le_bytes());
        assert!(decode_lonely_faces(&buf).is_err());
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let mut buf = BytesMut::new();
        put_lonely_face(&mut buf, &sample()).unwrap();
        let err = decode_lonely_faces(&buf[..40]).unwrap_err();
        assert!(matches!(err, MeshConnectError::ProtocolViolation(_)));
    }

    #[test]
    fn bad_face_and_flags_are_rejected() {
        let mut buf = BytesMut::new();
        put_lonely_face(&mut buf, &sample()).unwrap();
        let mut bad_face = buf.clone();
        bad_face[4..8].copy_from_slice(&3u32.to_le_bytes());
        assert!(decode_lonely_faces(&bad_face).is_err());
        let mut bad_flags = buf.clone();
        bad_flags[28..32].copy_from_slice(&4u32.to_le_bytes());
        assert!(decode_lonely_faces(&bad_flags).is_err());
    }

    #[test]
    fn oversized_index_does_not_encode() {
        let mut f = sample();
        f.element = u32::MAX as usize + 1;
        let mut buf = BytesMut::new();
        assert!(put_lonely_face(&mut buf, &f).is_err());
    }

    #[test]
    fn arrays_check_length() {
        let bytes = encode_array(&[1.5f64, -2.0]);
        assert_eq!(decode_array::<f64>(&bytes, 2).unwrap(), vec![1.5, -2.0]);
        assert!(decode_array::<f64>(&bytes, 3).is_err());
        let tags = encode_array(&[-1i32, 4]);
        assert_eq!(decode_array::<i32>(&tags, 2).unwrap(), vec![-1, 4]);
    }

    #[test]
    fn dist_header_guards_version_and_status() {
        let hdr = WireDistHdr::new(DistStatus::Abort, 5);
        let bytes = bytemuck::bytes_of(&hdr).to_vec();
        let back = WireDistHdr::decode(&bytes).unwrap();
        assert_eq!(back.status().unwrap(), DistStatus::Abort);
        assert_eq!(back.count(), 5);

        let mut wrong = bytes.clone();
        wrong[0] = 9;
        assert!(WireDistHdr::decode(&wrong).is_err());
        assert!(WireDistHdr::decode(&bytes[..4]).is_err());
    }
}
