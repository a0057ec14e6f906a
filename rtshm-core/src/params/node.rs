//! Node layouts of the parameter tree.
//!
//! ```text
//! section    [next: u64][child: u64][parameter: u64][name: 80]
//! parameter  [next: u64][first value: u64][name: 80]
//! value      [next: u64][kind: u32][reserved: u32][payload: u64]
//! string     [len: u32][reserved: u32][bytes ...]
//! ```

/// Maximum length of a section or parameter name in bytes.
pub const PARAM_NAME_MAX: usize = 80;

/// Marker type for `RelPtr`s to section nodes.
#[derive(Debug)]
pub enum SectionNode {}

/// Marker type for `RelPtr`s to parameter nodes.
#[derive(Debug)]
pub enum ParameterNode {}

/// Marker type for `RelPtr`s to value nodes.
#[derive(Debug)]
pub enum ValueNode {}

pub(crate) mod section {
    pub(crate) const NEXT: u64 = 0;
    pub(crate) const CHILD: u64 = 8;
    pub(crate) const PARAMETER: u64 = 16;
    pub(crate) const NAME: u64 = 24;
    pub(crate) const SIZE: usize = NAME as usize + super::PARAM_NAME_MAX;
}

pub(crate) mod parameter {
    pub(crate) const NEXT: u64 = 0;
    pub(crate) const FIRST_VALUE: u64 = 8;
    pub(crate) const NAME: u64 = 16;
    pub(crate) const SIZE: usize = NAME as usize + super::PARAM_NAME_MAX;
}

pub(crate) mod value {
    pub(crate) const NEXT: u64 = 0;
    pub(crate) const KIND: u64 = 8;
    pub(crate) const PAYLOAD: u64 = 16;
    pub(crate) const SIZE: usize = 24;
}

pub(crate) mod string {
    pub(crate) const LEN: u64 = 0;
    pub(crate) const BYTES: u64 = 8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_sizes() {
        assert_eq!(section::SIZE, 104);
        assert_eq!(parameter::SIZE, 96);
        assert_eq!(value::SIZE, 24);
    }
}
