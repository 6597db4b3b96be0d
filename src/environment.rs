// Lexical environment: an arena of variable frames
// Frames are addressed by index and chained through their parent ids

use std::collections::HashMap;

use crate::value::JValue;

/// Index of a frame in an [`Environment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(usize);

#[derive(Debug, Default)]
struct Frame {
    parent: Option<FrameId>,
    bindings: HashMap<String, JValue>,
}

/// Variable frames for a single evaluation.
///
/// Child frames are pushed for blocks, lambda invocations and positional
/// bindings. Once a construct finishes and its result holds no function
/// value, the frames it pushed can be reclaimed with [`Environment::release`].
#[derive(Debug)]
pub struct Environment {
    frames: Vec<Frame>,
    /// Frames below this index may be referenced from an older frame.
    floor: usize,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            frames: vec![Frame::default()],
            floor: 1,
        }
    }

    /// The outermost frame, holding `$` and any caller bindings.
    pub fn root(&self) -> FrameId {
        FrameId(0)
    }

    /// Create a child frame of `parent`.
    pub fn push(&mut self, parent: FrameId) -> FrameId {
        self.frames.push(Frame {
            parent: Some(parent),
            bindings: HashMap::new(),
        });
        FrameId(self.frames.len() - 1)
    }

    pub fn bind(&mut self, frame: FrameId, name: impl Into<String>, value: JValue) {
        // A closure stored into an older frame must outlive the frames above it
        if frame.0 + 1 < self.frames.len() && value.contains_function() {
            self.floor = self.floor.max(self.frames.len());
        }
        if let Some(f) = self.frames.get_mut(frame.0) {
            f.bindings.insert(name.into(), value);
        }
    }

    /// Walk the parent chain from `frame` looking for `name`.
    pub fn lookup(&self, frame: FrameId, name: &str) -> Option<&JValue> {
        let mut current = Some(frame);
        while let Some(id) = current {
            let f = self.frames.get(id.0)?;
            if let Some(value) = f.bindings.get(name) {
                return Some(value);
            }
            current = f.parent;
        }
        None
    }

    /// Current height of the arena, to hand back to [`Environment::release`].
    #[inline]
    pub fn mark(&self) -> usize {
        self.frames.len()
    }

    /// Drop every frame pushed since `mark`.
    pub fn release(&mut self, mark: usize) {
        let keep = mark.max(self.floor);
        if keep < self.frames.len() {
            self.frames.truncate(keep);
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parents() {
        let mut env = Environment::new();
        let root = env.root();
        env.bind(root, "x", JValue::from(1i64));
        let child = env.push(root);
        env.bind(child, "y", JValue::from(2i64));

        assert_eq!(env.lookup(child, "x"), Some(&JValue::from(1i64)));
        assert_eq!(env.lookup(child, "y"), Some(&JValue::from(2i64)));
        assert_eq!(env.lookup(root, "y"), None);
    }

    #[test]
    fn test_child_shadows_parent() {
        let mut env = Environment::new();
        let root = env.root();
        env.bind(root, "x", JValue::from(1i64));
        let child = env.push(root);
        env.bind(child, "x", JValue::from("inner"));

        assert_eq!(env.lookup(child, "x"), Some(&JValue::from("inner")));
        assert_eq!(env.lookup(root, "x"), Some(&JValue::from(1i64)));
    }

    #[test]
    fn test_release_reclaims_frames() {
        let mut env = Environment::new();
        let root = env.root();
        let mark = env.mark();
        let a = env.push(root);
        env.push(a);
        assert_eq!(env.len(), 3);

        env.release(mark);
        assert_eq!(env.len(), 1);
        assert_eq!(env.lookup(a, "anything"), None);
    }

    #[test]
    fn test_function_bound_into_older_frame_pins_arena() {
        let mut env = Environment::new();
        let root = env.root();
        let mark = env.mark();
        env.push(root);
        env.bind(root, "f", JValue::Builtin(crate::functions::BuiltinFn::Sum));

        env.release(mark);
        assert_eq!(env.len(), 2);
    }
}
