use bytes::{BytesMut, Bytes, BufMut};

/// Exposes the uninitialized write tail of a BytesMut as a mutable slice.
/// Caller must not read from it until it has been written and the length
/// advanced with `set_len`/`advance_mut`.
pub unsafe fn bytes_to_slice_mut(buf: &mut BytesMut) -> &mut [u8] {
    let maybe_uninit = buf.chunk_mut();
    std::slice::from_raw_parts_mut(maybe_uninit.as_mut_ptr(), maybe_uninit.len())
}

struct BytesAlike {
    data: *const u8,
    len: usize,
    _1: usize,
    _2: usize,
}

/// If b2 follows directly after b1 in the same allocation, merges it into b1
/// (zero-copy) and returns b1 alone. Otherwise returns both unchanged.
///
/// Safety: relies on the private layout of `Bytes` (pointer, len, two more
/// words). Only call this with Bytes values that were split from the same
/// BytesMut/Bytes — merging unrelated allocations is undefined behavior.
pub unsafe fn unsplit_bytes(mut b1: Bytes, b2: Bytes) -> (Option<Bytes>, Option<Bytes>) {
    if bytes_are_contiguous(&b1, &b2) {
        assert_eq!(std::mem::size_of::<Bytes>(), std::mem::size_of::<BytesAlike>());
        let p = b1.as_ptr();
        let len = b1.len();
        let bytes_ref = &mut *(&mut b1 as *mut Bytes as *mut BytesAlike);
        if bytes_ref.data == p && bytes_ref.len == len {
            bytes_ref.len += b2.len();
            return (Some(b1), None);
        }
    }
    (Some(b1), Some(b2))
}

/// Returns true if b2 immediately follows b1 in memory.
pub fn bytes_are_contiguous(b1: &Bytes, b2: &Bytes) -> bool {
    let end = unsafe { b1.as_ptr().add(b1.len()) };
    end == b2.as_ptr()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsplit_bytes_success() {
        let s = "foobar".as_bytes();
        let mut b1 = Bytes::from(s);
        let b2 = b1.split_off(3);
        assert!(bytes_are_contiguous(&b1, &b2));
        let (r1, r2) = unsafe { unsplit_bytes(b1, b2) };
        assert!(r1.is_some());
        assert!(r2.is_none());
        assert_eq!(&r1.unwrap()[..], s);
    }

    #[test]
    fn test_unsplit_bytes_fail() {
        let foo = "foopad".as_bytes();
        let bar = "bar".as_bytes();
        let b1 = Bytes::from(&foo[..3]);
        let b2 = Bytes::from(bar);
        assert!(!bytes_are_contiguous(&b1, &b2));
        let (r1, r2) = unsafe { unsplit_bytes(b1, b2) };
        assert_eq!(r1.is_some(), r2.is_some());
        assert_eq!(&r1.unwrap()[..], &foo[..3]);
        assert_eq!(&r2.unwrap()[..], bar);
    }
}
