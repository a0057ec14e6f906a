//! Section, parameter and value resolution.

use super::node::{
    PARAM_NAME_MAX, ParameterNode, SectionNode, ValueNode, parameter, section, string, value,
};
use super::path::{split_segment, validate_path};
use super::value::{Scalar, Slot, Value, ValueKind, claim_kind, load_kind};
use crate::arena::{
    Arena, ArenaGuard, Mapping, TREE_LOCK_FIELD, TREE_ROOT_FIELD, allocate_locked, free_locked,
};
use crate::error::{Result, RtshmError};
use crate::types::{ArenaOffset, RelPtr, name_eq, read_name, validate_name, write_name};

/// Whether a lookup may create missing nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Create,
    Find,
}

/// Allocate the root section and record it in the tree header.
pub(crate) fn init_root(guard: &ArenaGuard<'_>) -> Result<ArenaOffset> {
    let mapping = guard.mapping();
    let root = allocate_locked(guard, section::SIZE)?;
    mapping.store_offset(TREE_ROOT_FIELD, root)?;
    mapping.store_u32(TREE_LOCK_FIELD, 0)?;
    Ok(root)
}

/// Hierarchical configuration tree stored in an arena.
///
/// Lookups through [`section`](Self::section), [`parameter`](Self::parameter)
/// and [`value`](Self::value) create missing nodes on the way; the `find_*`
/// variants never create anything.
#[derive(Clone)]
pub struct ParamTree {
    arena: Arena,
}

impl ParamTree {
    /// Open the parameter tree of `arena`.
    pub fn new(arena: &Arena) -> Self {
        Self {
            arena: arena.clone(),
        }
    }

    pub(crate) fn arena(&self) -> &Arena {
        &self.arena
    }

    pub(crate) fn mapping(&self) -> Result<&Mapping> {
        self.arena
            .mapping()
            .map_err(|_| RtshmError::NotInitialized {
                component: "parameter tree",
            })
    }

    fn root(&self, mapping: &Mapping) -> Result<ArenaOffset> {
        let root = mapping.load_offset(TREE_ROOT_FIELD)?;
        if root.is_null() {
            return Err(RtshmError::NotInitialized {
                component: "parameter tree",
            });
        }
        Ok(root)
    }

    /// Upper bound on nodes in any one list, for cycle detection.
    fn step_limit(mapping: &Mapping) -> usize {
        mapping.len() / value::SIZE + 1
    }

    fn cycle(at: ArenaOffset) -> RtshmError {
        tracing::error!(offset = %at, "Parameter tree list does not terminate");
        RtshmError::ArenaCorruption {
            offset: at,
            cause: "parameter tree list does not terminate".to_string(),
        }
    }

    /// Follow the link word at `link`, creating a `size`-byte node named
    /// `name` when the link is null and `mode` allows it.
    ///
    /// Creation re-checks the link and the structural lock under the arena
    /// mutex, so a node is published at most once per link.
    fn follow(
        &self,
        link: ArenaOffset,
        mode: Mode,
        size: usize,
        name: Option<(u64, &str)>,
        missing: impl FnOnce() -> String,
    ) -> Result<ArenaOffset> {
        let mapping = self.mapping()?;
        let next = mapping.load_offset(link)?;
        if !next.is_null() {
            return Ok(next);
        }
        if mode == Mode::Find {
            return Err(RtshmError::NotFound { what: missing() });
        }

        let node = {
            let guard = ArenaGuard::acquire(mapping)?;
            let next = mapping.load_offset(link)?;
            if !next.is_null() {
                return Ok(next);
            }
            if mapping.load_u32(TREE_LOCK_FIELD)? != 0 {
                tracing::warn!(what = %missing(), "Parameter tree is locked");
                return Err(RtshmError::Locked {
                    component: "parameter tree",
                });
            }

            let node = allocate_locked(&guard, size)?;
            if let Some((field, name)) = name {
                if let Err(e) = write_name(mapping, node.add(field), PARAM_NAME_MAX, name) {
                    free_locked(&guard, node)?;
                    return Err(e);
                }
            }
            mapping.store_offset(link, node)?;
            node
        };

        tracing::debug!(offset = %node, name = name.map(|(_, n)| n), size, "Created tree node");
        self.arena.written()?;
        Ok(node)
    }

    fn resolve_section(&self, path: &str, mode: Mode) -> Result<ArenaOffset> {
        validate_path(path)?;
        let mapping = self.mapping()?;
        let limit = Self::step_limit(mapping);
        let missing = || format!("section '{}'", path);

        let mut base = self.root(mapping)?;
        let mut rest = path;
        let mut steps = 0usize;
        loop {
            steps += 1;
            if steps > limit {
                return Err(Self::cycle(base));
            }

            let (segment, remainder) = split_segment(rest);
            if name_eq(mapping, base.add(section::NAME), PARAM_NAME_MAX, segment)? {
                if remainder.is_empty() {
                    return Ok(base);
                }
                let (child, _) = split_segment(remainder);
                base = self.follow(
                    base.add(section::CHILD),
                    mode,
                    section::SIZE,
                    Some((section::NAME, child)),
                    missing,
                )?;
                rest = remainder;
            } else {
                base = self.follow(
                    base.add(section::NEXT),
                    mode,
                    section::SIZE,
                    Some((section::NAME, segment)),
                    missing,
                )?;
            }
        }
    }

    fn resolve_parameter(&self, path: &str, name: &str, mode: Mode) -> Result<ArenaOffset> {
        validate_name(name, PARAM_NAME_MAX)?;
        let base = self.resolve_section(path, mode)?;
        let mapping = self.mapping()?;
        let limit = Self::step_limit(mapping);

        let mut link = base.add(section::PARAMETER);
        for _ in 0..limit {
            let node = self.follow(
                link,
                mode,
                parameter::SIZE,
                Some((parameter::NAME, name)),
                || format!("parameter '{}' in '{}'", name, path),
            )?;
            if name_eq(mapping, node.add(parameter::NAME), PARAM_NAME_MAX, name)? {
                return Ok(node);
            }
            link = node.add(parameter::NEXT);
        }
        Err(Self::cycle(link))
    }

    fn resolve_value(&self, path: &str, name: &str, index: usize, mode: Mode) -> Result<ArenaOffset> {
        let missing = || format!("value '{}'[{}] in '{}'", name, index, path);
        // No region can hold more value nodes than this.
        if index >= Self::step_limit(self.mapping()?) {
            return Err(match mode {
                Mode::Find => RtshmError::NotFound { what: missing() },
                Mode::Create => RtshmError::OutOfSpace {
                    requested: (index as u64).saturating_add(1).saturating_mul(value::SIZE as u64),
                    largest_free: self.arena.stats()?.largest_free,
                },
            });
        }

        let param = self.resolve_parameter(path, name, mode)?;
        let mut node = self.follow(param.add(parameter::FIRST_VALUE), mode, value::SIZE, None, missing)?;
        for _ in 0..index {
            let next = self.follow(node.add(value::NEXT), mode, value::SIZE, None, missing)?;
            if next == node {
                return Err(Self::cycle(node));
            }
            node = next;
        }
        Ok(node)
    }

    /// Section at `path`, creating it and any missing ancestors.
    ///
    /// Paths without a leading `/` resolve among the root's siblings.
    pub fn section(&self, path: &str) -> Result<RelPtr<SectionNode>> {
        self.resolve_section(path, Mode::Create).map(RelPtr::new)
    }

    /// Existing section at `path`.
    pub fn find_section(&self, path: &str) -> Result<RelPtr<SectionNode>> {
        self.resolve_section(path, Mode::Find).map(RelPtr::new)
    }

    /// Parameter `name` of the section at `path`, appending it if absent.
    pub fn parameter(&self, path: &str, name: &str) -> Result<RelPtr<ParameterNode>> {
        self.resolve_parameter(path, name, Mode::Create)
            .map(RelPtr::new)
    }

    /// Existing parameter `name` of the section at `path`.
    pub fn find_parameter(&self, path: &str, name: &str) -> Result<RelPtr<ParameterNode>> {
        self.resolve_parameter(path, name, Mode::Find)
            .map(RelPtr::new)
    }

    /// Value `index` of parameter `name`, extending the value list with
    /// unset values until `index` exists.
    pub fn value(&self, path: &str, name: &str, index: usize) -> Result<RelPtr<ValueNode>> {
        self.resolve_value(path, name, index, Mode::Create)
            .map(RelPtr::new)
    }

    /// Existing value `index` of parameter `name`.
    pub fn find_value(&self, path: &str, name: &str, index: usize) -> Result<RelPtr<ValueNode>> {
        self.resolve_value(path, name, index, Mode::Find)
            .map(RelPtr::new)
    }

    /// Check that value `index` of parameter `name` exists, without creating
    /// anything. Fails with `NotFound` otherwise.
    pub fn check(&self, path: &str, name: &str, index: usize) -> Result<()> {
        self.resolve_value(path, name, index, Mode::Find).map(|_| ())
    }

    /// In-place accessor for a scalar value, creating the value if needed.
    pub fn slot<T: Scalar>(&self, path: &str, name: &str, index: usize) -> Result<Slot<'_, T>> {
        Ok(Slot::new(self, self.value(path, name, index)?))
    }

    /// Read a boolean value.
    pub fn get_bool(&self, path: &str, name: &str, index: usize) -> Result<bool> {
        self.slot::<bool>(path, name, index)?.get()
    }

    /// Write a boolean value.
    pub fn set_bool(&self, path: &str, name: &str, index: usize, value: bool) -> Result<()> {
        self.slot::<bool>(path, name, index)?.set(value)
    }

    /// Read an integer value.
    pub fn get_int(&self, path: &str, name: &str, index: usize) -> Result<i64> {
        self.slot::<i64>(path, name, index)?.get()
    }

    /// Write an integer value.
    pub fn set_int(&self, path: &str, name: &str, index: usize, value: i64) -> Result<()> {
        self.slot::<i64>(path, name, index)?.set(value)
    }

    /// Read a double value.
    pub fn get_double(&self, path: &str, name: &str, index: usize) -> Result<f64> {
        self.slot::<f64>(path, name, index)?.get()
    }

    /// Write a double value.
    pub fn set_double(&self, path: &str, name: &str, index: usize, value: f64) -> Result<()> {
        self.slot::<f64>(path, name, index)?.set(value)
    }

    /// Read a string value. An unset value reads as `""`.
    pub fn get_string(&self, path: &str, name: &str, index: usize) -> Result<String> {
        let node = self.value(path, name, index)?.offset();
        match load_kind(self, node)? {
            ValueKind::Unset => Ok(String::new()),
            ValueKind::String => self.load_string(node),
            kind => Err(RtshmError::TypeMismatch {
                expected: ValueKind::String.name(),
                actual: kind.name(),
            }),
        }
    }

    /// Write a string value.
    ///
    /// New storage is allocated before the old string is released, so on
    /// `OutOfSpace` the previous value, including an unset kind, is left
    /// intact.
    pub fn set_string(&self, path: &str, name: &str, index: usize, text: &str) -> Result<()> {
        let node = self.value(path, name, index)?.offset();
        match load_kind(self, node)? {
            ValueKind::Unset | ValueKind::String => {}
            kind => {
                return Err(RtshmError::TypeMismatch {
                    expected: ValueKind::String.name(),
                    actual: kind.name(),
                });
            }
        }

        let len = u32::try_from(text.len()).map_err(|_| RtshmError::OutOfSpace {
            requested: text.len() as u64,
            largest_free: 0,
        })?;
        let mapping = self.mapping()?;
        let payload = node.add(value::PAYLOAD);

        let (new, old) = {
            let guard = ArenaGuard::acquire(mapping)?;
            let new = allocate_locked(&guard, string::BYTES as usize + text.len())?;
            // The kind is only claimed once storage exists.
            if let Err(e) = claim_kind(self, node, ValueKind::String) {
                free_locked(&guard, new)?;
                return Err(e);
            }
            mapping.store_u32(new.add(string::LEN), len)?;
            mapping.write_bytes(new.add(string::BYTES), text.as_bytes())?;

            let old = mapping.load_offset(payload)?;
            mapping.store_offset(payload, new)?;
            if !old.is_null() {
                free_locked(&guard, old)?;
            }
            (new, old)
        };

        tracing::debug!(path, name, index, %new, %old, len, "Replaced string value");
        self.arena.written()
    }

    fn load_string(&self, node: ArenaOffset) -> Result<String> {
        let mapping = self.mapping()?;
        let at = mapping.load_offset(node.add(value::PAYLOAD))?;
        if at.is_null() {
            return Ok(String::new());
        }
        let len = mapping.load_u32(at.add(string::LEN))? as usize;
        let bytes = mapping.read_bytes(at.add(string::BYTES), len)?;
        String::from_utf8(bytes).map_err(|_| RtshmError::ArenaCorruption {
            offset: at,
            cause: "string value is not valid UTF-8".to_string(),
        })
    }

    /// Owned copy of the value stored in `node`.
    pub(crate) fn load_value(&self, node: ArenaOffset) -> Result<Value> {
        let mapping = self.mapping()?;
        let raw = || mapping.load_u64(node.add(value::PAYLOAD));
        Ok(match load_kind(self, node)? {
            ValueKind::Unset => Value::Unset,
            ValueKind::Bool => Value::Bool(bool::decode(raw()?)),
            ValueKind::Int => Value::Int(i64::decode(raw()?)),
            ValueKind::Double => Value::Double(f64::decode(raw()?)),
            ValueKind::String => Value::String(self.load_string(node)?),
        })
    }

    /// Read value `index` of parameter `name` without creating anything.
    pub fn read(&self, path: &str, name: &str, index: usize) -> Result<Value> {
        let node = self.find_value(path, name, index)?;
        self.load_value(node.offset())
    }

    /// Iterate over the values of an existing parameter.
    pub fn values(&self, path: &str, name: &str) -> Result<Values<'_>> {
        let param = self.find_parameter(path, name)?;
        let first = self
            .mapping()?
            .load_offset(param.field(parameter::FIRST_VALUE))?;
        Ok(Values {
            tree: self,
            next: first,
            remaining: Self::step_limit(self.mapping()?),
        })
    }

    /// Collect the names along a list starting at the link word `link`.
    fn list_names(&self, mut link: ArenaOffset, next: u64, name: u64) -> Result<Vec<String>> {
        let mapping = self.mapping()?;
        let mut names = Vec::new();
        for _ in 0..Self::step_limit(mapping) {
            let node = mapping.load_offset(link)?;
            if node.is_null() {
                return Ok(names);
            }
            names.push(read_name(mapping, node.add(name), PARAM_NAME_MAX)?);
            link = node.add(next);
        }
        Err(Self::cycle(link))
    }

    /// Names of the child sections of an existing section.
    pub fn sections(&self, path: &str) -> Result<Vec<String>> {
        let base = self.find_section(path)?;
        self.list_names(base.field(section::CHILD), section::NEXT, section::NAME)
    }

    /// Names of the parameters of an existing section.
    pub fn parameters(&self, path: &str) -> Result<Vec<String>> {
        let base = self.find_section(path)?;
        self.list_names(
            base.field(section::PARAMETER),
            parameter::NEXT,
            parameter::NAME,
        )
    }

    /// Set or clear the structural lock.
    ///
    /// While set, creating sections, parameters or values fails with
    /// `Locked`; existing values stay readable and writable.
    pub fn set_locked(&self, locked: bool) -> Result<()> {
        let mapping = self.mapping()?;
        let _guard = ArenaGuard::acquire(mapping)?;
        mapping.store_u32(TREE_LOCK_FIELD, u32::from(locked))?;
        tracing::info!(locked, "Parameter tree lock changed");
        Ok(())
    }

    /// Check if the structural lock is set.
    pub fn is_locked(&self) -> Result<bool> {
        Ok(self.mapping()?.load_u32(TREE_LOCK_FIELD)? != 0)
    }

    pub(crate) fn root_offset(&self) -> Result<ArenaOffset> {
        self.root(self.mapping()?)
    }

    pub(crate) fn limit(&self) -> Result<usize> {
        Ok(Self::step_limit(self.mapping()?))
    }
}

impl std::fmt::Debug for ParamTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamTree")
            .field("arena", &self.arena)
            .finish()
    }
}

/// Iterator over the values of one parameter, in index order.
#[derive(Debug)]
pub struct Values<'a> {
    tree: &'a ParamTree,
    next: ArenaOffset,
    remaining: usize,
}

impl Iterator for Values<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next.is_null() {
            return None;
        }
        let node = self.next;
        if self.remaining == 0 {
            self.next = ArenaOffset::NULL;
            return Some(Err(ParamTree::cycle(node)));
        }
        self.remaining -= 1;

        let item = self.tree.load_value(node).and_then(|v| {
            self.next = self.tree.mapping()?.load_offset(node.add(value::NEXT))?;
            Ok(v)
        });
        if item.is_err() {
            self.next = ArenaOffset::NULL;
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> ParamTree {
        ParamTree::new(&Arena::anonymous(32 * 1024).unwrap())
    }

    #[test]
    fn root_resolves_from_slash_and_empty() {
        let tree = tree();
        let root = tree.root_offset().unwrap();
        assert_eq!(tree.section("/").unwrap().offset(), root);
        assert_eq!(tree.section("").unwrap().offset(), root);
        assert_eq!(tree.find_section("/").unwrap().offset(), root);
    }

    #[test]
    fn section_creation_is_idempotent() {
        let tree = tree();
        let a = tree.section("/sec1/subsec1").unwrap();
        let before = tree.arena().stats().unwrap();
        let b = tree.section("/sec1/subsec1").unwrap();
        assert_eq!(a, b);
        assert_eq!(tree.arena().stats().unwrap(), before);
        assert_eq!(tree.find_section("/sec1/subsec1").unwrap(), a);
    }

    #[test]
    fn siblings_and_children() {
        let tree = tree();
        for path in [
            "/sec1/subsec1/subsubsec1",
            "/sec1/subsec1/subsubsec2",
            "/sec1/subsec2/subsubsec3",
            "/sec2",
        ] {
            tree.section(path).unwrap();
        }
        assert_eq!(tree.sections("/").unwrap(), ["sec1", "sec2"]);
        assert_eq!(tree.sections("/sec1").unwrap(), ["subsec1", "subsec2"]);
        assert_eq!(
            tree.sections("/sec1/subsec1").unwrap(),
            ["subsubsec1", "subsubsec2"]
        );
        assert!(tree.sections("/sec2").unwrap().is_empty());
    }

    #[test]
    fn trailing_slash_names_same_section() {
        let tree = tree();
        let a = tree.section("/sec1").unwrap();
        assert_eq!(tree.section("/sec1/").unwrap(), a);
    }

    #[test]
    fn relative_path_becomes_root_sibling() {
        let tree = tree();
        let rel = tree.section("sec1").unwrap();
        let abs = tree.section("/sec1").unwrap();
        assert_ne!(rel, abs);
        assert!(tree.sections("/").unwrap().contains(&"sec1".to_string()));
    }

    #[test]
    fn find_does_not_create() {
        let tree = tree();
        let before = tree.arena().stats().unwrap();

        assert_eq!(tree.find_section("/nope").unwrap_err().code(), "E301");
        assert_eq!(tree.find_parameter("/", "p").unwrap_err().code(), "E301");
        assert_eq!(tree.find_value("/", "p", 0).unwrap_err().code(), "E301");
        assert_eq!(tree.check("/a/b", "p", 3).unwrap_err().code(), "E301");

        assert_eq!(tree.arena().stats().unwrap(), before);
    }

    #[test]
    fn parameters_append_in_order() {
        let tree = tree();
        for name in ["param1", "param2", "param1"] {
            tree.parameter("/sec", name).unwrap();
        }
        assert_eq!(tree.parameters("/sec").unwrap(), ["param1", "param2"]);
    }

    #[test]
    fn value_list_extends_to_index() {
        let tree = tree();
        tree.value("/sec", "p", 3).unwrap();
        let values: Vec<_> = tree.values("/sec", "p").unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(values, vec![Value::Unset; 4]);

        tree.check("/sec", "p", 3).unwrap();
        assert!(tree.check("/sec", "p", 4).is_err());
    }

    #[test]
    fn scalar_values() {
        let tree = tree();
        tree.set_int("/m", "count", 0, -7).unwrap();
        tree.set_double("/m", "ratio", 0, 0.25).unwrap();
        tree.set_bool("/m", "on", 0, true).unwrap();

        assert_eq!(tree.get_int("/m", "count", 0).unwrap(), -7);
        assert_eq!(tree.get_double("/m", "ratio", 0).unwrap(), 0.25);
        assert!(tree.get_bool("/m", "on", 0).unwrap());
        assert_eq!(tree.read("/m", "count", 0).unwrap(), Value::Int(-7));
    }

    #[test]
    fn unset_reads_as_zero() {
        let tree = tree();
        assert_eq!(tree.get_int("/z", "v", 0).unwrap(), 0);
        assert_eq!(tree.get_double("/z", "v", 0).unwrap(), 0.0);
        assert!(!tree.get_bool("/z", "v", 0).unwrap());
        assert_eq!(tree.get_string("/z", "v", 0).unwrap(), "");
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let tree = tree();
        tree.set_int("/k", "v", 0, 1).unwrap();

        let err = tree.get_double("/k", "v", 0).unwrap_err();
        assert_eq!(
            err,
            RtshmError::TypeMismatch {
                expected: "double",
                actual: "int"
            }
        );
        assert_eq!(tree.set_string("/k", "v", 0, "x").unwrap_err().code(), "E303");
        assert_eq!(tree.get_int("/k", "v", 0).unwrap(), 1);
    }

    #[test]
    fn slot_reads_and_writes_in_place() {
        let tree = tree();
        let slot = tree.slot::<i64>("/s", "n", 0).unwrap();
        slot.set(41).unwrap();
        slot.set(slot.get().unwrap() + 1).unwrap();
        assert_eq!(tree.get_int("/s", "n", 0).unwrap(), 42);
        assert_eq!(slot.node(), tree.find_value("/s", "n", 0).unwrap());
    }

    #[test]
    fn string_overwrite_frees_old_storage() {
        let tree = tree();
        tree.set_string("/s", "label", 0, "motor-a").unwrap();
        let after_first = tree.arena().stats().unwrap();

        tree.set_string("/s", "label", 0, "motor-b").unwrap();
        assert_eq!(tree.get_string("/s", "label", 0).unwrap(), "motor-b");
        let after_second = tree.arena().stats().unwrap();
        assert_eq!(after_second.allocated_bytes, after_first.allocated_bytes);
        assert_eq!(after_second.free_bytes, after_first.free_bytes);
    }

    #[test]
    fn repeated_string_overwrites_hold_allocation_steady() {
        let tree = tree();
        tree.set_string("/s", "label", 0, "motor-a").unwrap();
        let settled = tree.arena().stats().unwrap().allocated_bytes;

        for i in 0..50 {
            let label = format!("motor-{}", i % 10);
            tree.set_string("/s", "label", 0, &label).unwrap();
            assert_eq!(tree.arena().stats().unwrap().allocated_bytes, settled);
        }
        assert_eq!(tree.get_string("/s", "label", 0).unwrap(), "motor-9");
    }

    #[test]
    fn string_out_of_space_keeps_old_value() {
        let tree = ParamTree::new(&Arena::anonymous(2048).unwrap());
        tree.set_string("/", "s", 0, "keep").unwrap();

        let huge = "x".repeat(4096);
        assert_eq!(tree.set_string("/", "s", 0, &huge).unwrap_err().code(), "E004");
        assert_eq!(tree.get_string("/", "s", 0).unwrap(), "keep");
    }

    #[test]
    fn string_out_of_space_leaves_unset_value_untyped() {
        let tree = ParamTree::new(&Arena::anonymous(2048).unwrap());
        let before = tree.arena().stats().unwrap().allocated_bytes;
        tree.value("/", "v", 0).unwrap();
        let with_node = tree.arena().stats().unwrap().allocated_bytes;
        assert!(with_node > before);

        let huge = "x".repeat(4096);
        assert_eq!(tree.set_string("/", "v", 0, &huge).unwrap_err().code(), "E004");
        assert_eq!(tree.read("/", "v", 0).unwrap(), Value::Unset);
        assert_eq!(tree.arena().stats().unwrap().allocated_bytes, with_node);

        tree.set_int("/", "v", 0, 3).unwrap();
        assert_eq!(tree.get_int("/", "v", 0).unwrap(), 3);
    }

    #[test]
    fn string_write_to_other_kind_allocates_nothing() {
        let tree = tree();
        tree.set_bool("/", "flag", 0, true).unwrap();
        let before = tree.arena().stats().unwrap();

        assert_eq!(tree.set_string("/", "flag", 0, "on").unwrap_err().code(), "E303");
        assert_eq!(tree.arena().stats().unwrap(), before);
    }

    #[test]
    fn cyclic_value_list_is_corruption() {
        let tree = tree();
        let first = tree.value("/c", "p", 0).unwrap();
        tree.mapping()
            .unwrap()
            .store_offset(first.field(value::NEXT), first.offset())
            .unwrap();

        assert!(tree.value("/c", "p", 5).unwrap_err().is_fatal());
        assert!(tree.check("/c", "p", 5).unwrap_err().is_fatal());
    }

    #[test]
    fn unreachable_index_is_rejected_up_front() {
        let tree = ParamTree::new(&Arena::anonymous(2048).unwrap());
        let before = tree.arena().stats().unwrap();

        assert_eq!(tree.check("/", "p", usize::MAX).unwrap_err().code(), "E301");
        assert_eq!(tree.value("/", "p", 1_000_000).unwrap_err().code(), "E004");
        assert_eq!(tree.find_parameter("/", "p").unwrap_err().code(), "E301");
        assert_eq!(tree.arena().stats().unwrap(), before);
    }

    #[test]
    fn lock_blocks_creation_only() {
        let tree = tree();
        tree.set_int("/sec", "p", 0, 1).unwrap();
        tree.set_locked(true).unwrap();
        assert!(tree.is_locked().unwrap());

        assert_eq!(tree.section("/other").unwrap_err().code(), "E102");
        assert_eq!(tree.parameter("/sec", "q").unwrap_err().code(), "E102");
        assert_eq!(tree.value("/sec", "p", 1).unwrap_err().code(), "E102");

        tree.set_int("/sec", "p", 0, 2).unwrap();
        assert_eq!(tree.get_int("/sec", "p", 0).unwrap(), 2);

        tree.set_locked(false).unwrap();
        tree.section("/other").unwrap();
    }

    #[test]
    fn invalid_names_create_nothing() {
        let tree = tree();
        let before = tree.arena().stats().unwrap();
        let long = "n".repeat(PARAM_NAME_MAX + 1);

        let path = format!("/ok/{}", long);
        assert_eq!(tree.section(&path).unwrap_err().code(), "E302");
        assert_eq!(tree.parameter("/ok", &long).unwrap_err().code(), "E302");
        assert_eq!(tree.section("/a\0b").unwrap_err().code(), "E302");

        assert_eq!(tree.arena().stats().unwrap(), before);
    }

    #[test]
    fn detached_arena_is_not_initialized() {
        let tree = tree();
        tree.arena().detach();
        assert_eq!(tree.section("/x").unwrap_err().code(), "E101");
    }
}
