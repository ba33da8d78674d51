/// A key/value pair stored in a version chain.
///
/// The all-default entry (`key == 0`, `value == V::default()`) is the empty
/// sentinel: it fills every bucket at version 0 and is written by `delete` to
/// shadow a removed value. Key 0 therefore cannot carry a real value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Entry<V = u64> {
    pub key: u64,
    pub value: V,
}

impl<V: Copy + Default + Eq> Entry<V> {
    pub fn new(key: u64, value: V) -> Self {
        Self { key, value }
    }

    /// The empty sentinel.
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }

    /// True if this is a live entry for `key`.
    #[inline]
    pub(crate) fn holds(&self, key: u64) -> bool {
        !self.is_empty() && self.key == key
    }
}
