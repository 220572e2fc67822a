// crates/framepipe-core/src/filter.rs
//
// FilterKind and the parameter bag shared by every Filter. Shader source
// and GPU handles are owned by framepipe-engine (they need the GpuContext
// trait, which is also here, but the compiled program/VBO live on the
// engine-side Filter struct); this module is just the identity + params.

use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterKind {
    /// Internal preprocessing step normalizing decoder-output origin
    /// convention to GPU texture space. Not user-addable via `AddVideoFilter`.
    FlipVertical,
    Gray,
    Invert,
    Sticker,
}

impl FilterKind {
    /// Whether this kind may be added/removed through the public filter API.
    pub fn is_user_addable(self) -> bool {
        !matches!(self, FilterKind::FlipVertical)
    }
}

/// Opaque string-keyed parameter bag. The Sticker filter recognizes
/// `StickerPath` / `ModelPath` string parameters; other kinds ignore all
/// parameters set on them.
#[derive(Clone, Debug, Default)]
pub struct FilterParams {
    floats: HashMap<String, f32>,
    ints: HashMap<String, i32>,
    strings: HashMap<String, String>,
}

impl FilterParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        self.floats.insert(name.to_string(), value);
    }

    pub fn get_float(&self, name: &str) -> Option<f32> {
        self.floats.get(name).copied()
    }

    pub fn set_int(&mut self, name: &str, value: i32) {
        self.ints.insert(name.to_string(), value);
    }

    pub fn get_int(&self, name: &str) -> Option<i32> {
        self.ints.get(name).copied()
    }

    pub fn set_string(&mut self, name: &str, value: impl Into<String>) {
        self.strings.insert(name.to_string(), value.into());
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.strings.get(name).map(String::as_str)
    }
}

pub const STICKER_PATH_PARAM: &str = "StickerPath";
pub const STICKER_MODEL_PATH_PARAM: &str = "ModelPath";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_vertical_is_not_user_addable() {
        assert!(!FilterKind::FlipVertical.is_user_addable());
        assert!(FilterKind::Gray.is_user_addable());
    }

    #[test]
    fn params_roundtrip_by_name() {
        let mut p = FilterParams::new();
        p.set_string(STICKER_PATH_PARAM, "sticker.png");
        p.set_float("intensity", 0.5);
        assert_eq!(p.get_string(STICKER_PATH_PARAM), Some("sticker.png"));
        assert_eq!(p.get_float("intensity"), Some(0.5));
        assert_eq!(p.get_int("missing"), None);
    }
}
