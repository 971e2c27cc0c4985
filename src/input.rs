/// Keys this front-end reacts to. Anything else the event source may
/// deliver is ignored by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    W,
    A,
    S,
    D,
    T,
    L,
    Escape,
    Num(u8),
}

/// The four independent stick axes of a velocity command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    LeftRight,
    ForBack,
    UpDown,
    Yaw,
}

/// One row of the key-to-axis table: key-down writes `sign * speed` into
/// `axis`, key-up of any key bound to the same axis resets it to zero.
/// The paired-reset rule (e.g. releasing Left zeroes the axis even if
/// Right set it) falls out of the table, not out of code structure.
#[derive(Debug, Clone, Copy)]
pub struct KeyBinding {
    pub key: Key,
    pub axis: Axis,
    pub sign: i32,
}

pub const KEY_BINDINGS: &[KeyBinding] = &[
    KeyBinding {
        key: Key::Up,
        axis: Axis::ForBack,
        sign: 1,
    },
    KeyBinding {
        key: Key::Down,
        axis: Axis::ForBack,
        sign: -1,
    },
    KeyBinding {
        key: Key::Left,
        axis: Axis::LeftRight,
        sign: -1,
    },
    KeyBinding {
        key: Key::Right,
        axis: Axis::LeftRight,
        sign: 1,
    },
    KeyBinding {
        key: Key::W,
        axis: Axis::UpDown,
        sign: 1,
    },
    KeyBinding {
        key: Key::S,
        axis: Axis::UpDown,
        sign: -1,
    },
    KeyBinding {
        key: Key::A,
        axis: Axis::Yaw,
        sign: -1,
    },
    KeyBinding {
        key: Key::D,
        axis: Axis::Yaw,
        sign: 1,
    },
];

pub fn binding_for(key: Key) -> Option<&'static KeyBinding> {
    KEY_BINDINGS.iter().find(|b| b.key == key)
}

pub const VELOCITY_LIMIT: i32 = 100;

/// Per-device commanded velocity, each axis clamped to the symmetric
/// -100..100 range the SDK accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VelocityCommand {
    pub left_right: i32,
    pub for_back: i32,
    pub up_down: i32,
    pub yaw: i32,
}

impl VelocityCommand {
    pub fn set(&mut self, axis: Axis, value: i32) {
        let v = value.clamp(-VELOCITY_LIMIT, VELOCITY_LIMIT);
        match axis {
            Axis::LeftRight => self.left_right = v,
            Axis::ForBack => self.for_back = v,
            Axis::UpDown => self.up_down = v,
            Axis::Yaw => self.yaw = v,
        }
    }

    pub fn reset(&mut self, axis: Axis) {
        self.set(axis, 0);
    }

    pub fn get(&self, axis: Axis) -> i32 {
        match axis {
            Axis::LeftRight => self.left_right,
            Axis::ForBack => self.for_back,
            Axis::UpDown => self.up_down,
            Axis::Yaw => self.yaw,
        }
    }

    pub fn zero(&mut self) {
        *self = VelocityCommand::default();
    }

    pub fn is_zero(&self) -> bool {
        *self == VelocityCommand::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_directional_key_is_bound_once() {
        for key in [
            Key::Up,
            Key::Down,
            Key::Left,
            Key::Right,
            Key::W,
            Key::S,
            Key::A,
            Key::D,
        ] {
            let n = KEY_BINDINGS.iter().filter(|b| b.key == key).count();
            assert_eq!(n, 1, "{:?} bound {} times", key, n);
        }
        assert!(binding_for(Key::T).is_none());
        assert!(binding_for(Key::Escape).is_none());
    }

    #[test]
    fn test_paired_keys_share_an_axis() {
        let pairs = [
            (Key::Up, Key::Down),
            (Key::Left, Key::Right),
            (Key::W, Key::S),
            (Key::A, Key::D),
        ];
        for (a, b) in pairs {
            let ba = binding_for(a).unwrap();
            let bb = binding_for(b).unwrap();
            assert_eq!(ba.axis, bb.axis);
            assert_eq!(ba.sign, -bb.sign);
        }
    }

    #[test]
    fn test_velocity_set_reset() {
        let mut v = VelocityCommand::default();
        assert!(v.is_zero());

        v.set(Axis::ForBack, 60);
        assert_eq!(v.for_back, 60);
        v.set(Axis::Yaw, -60);
        assert_eq!(v.yaw, -60);

        v.reset(Axis::ForBack);
        assert_eq!(v.for_back, 0);
        assert_eq!(v.yaw, -60);

        v.zero();
        assert!(v.is_zero());
    }

    #[test]
    fn test_velocity_is_clamped() {
        let mut v = VelocityCommand::default();
        v.set(Axis::UpDown, 250);
        assert_eq!(v.up_down, VELOCITY_LIMIT);
        v.set(Axis::UpDown, -250);
        assert_eq!(v.up_down, -VELOCITY_LIMIT);
    }
}
