//! Fixed semantic structure of a theme: roles, elements and polarity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Theme polarity. Fixes the sign of every "lighter than" comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Dark,
    Light,
}

impl Polarity {
    /// +1 for dark themes (foreground is lighter), -1 for light themes.
    pub fn sign(self) -> f32 {
        match self {
            Polarity::Dark => 1.0,
            Polarity::Light => -1.0,
        }
    }

    /// Lightness gap from `from` to `to`, positive when `to` sits on the
    /// foreground side of `from`.
    pub fn gap(self, from: f32, to: f32) -> f32 {
        (to - from) * self.sign()
    }

    /// Move `l` by `amount` toward the foreground side.
    pub fn step(self, l: f32, amount: f32) -> f32 {
        l + amount * self.sign()
    }

    pub fn from_background_lightness(l: f32) -> Self {
        if l < 50.0 {
            Polarity::Dark
        } else {
            Polarity::Light
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Polarity::Dark => "dark",
            Polarity::Light => "light",
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Background,
    Surface,
    Overlay,
    Text,
    AccentRed,
    AccentWarm,
    AccentCool,
    AccentBridge,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Background,
        Role::Surface,
        Role::Overlay,
        Role::Text,
        Role::AccentRed,
        Role::AccentWarm,
        Role::AccentCool,
        Role::AccentBridge,
    ];

    pub const STRUCTURAL: [Role; 4] = [Role::Background, Role::Surface, Role::Overlay, Role::Text];

    pub const ACCENTS: [Role; 4] = [
        Role::AccentRed,
        Role::AccentWarm,
        Role::AccentCool,
        Role::AccentBridge,
    ];

    pub fn is_accent(self) -> bool {
        matches!(
            self,
            Role::AccentRed | Role::AccentWarm | Role::AccentCool | Role::AccentBridge
        )
    }

    /// Accent roles routinely used as syntax/highlight foreground. Their
    /// separation from the background is a hard requirement.
    pub fn is_foreground_safe(self) -> bool {
        matches!(self, Role::AccentCool | Role::AccentBridge)
    }

    pub fn elements(self) -> &'static [Element] {
        use Element::*;
        match self {
            Role::Background => &[Base, Mantle, Crust],
            Role::Surface => &[Surface0, Surface1, Surface2],
            Role::Overlay => &[Overlay0, Overlay1, Overlay2],
            Role::Text => &[Text, Subtext0, Subtext1],
            Role::AccentRed => &[Rosewater, Flamingo, Pink, Red, Maroon],
            Role::AccentWarm => &[Peach, Yellow, Green],
            Role::AccentCool => &[Blue, Sapphire, Sky, Lavender, Teal],
            Role::AccentBridge => &[Mauve],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Background => "background",
            Role::Surface => "surface",
            Role::Overlay => "overlay",
            Role::Text => "text",
            Role::AccentRed => "accent_red",
            Role::AccentWarm => "accent_warm",
            Role::AccentCool => "accent_cool",
            Role::AccentBridge => "accent_bridge",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown role {s:?}"))
    }
}

/// Set of roles a candidate is eligible for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RoleSet(u8);

impl RoleSet {
    pub fn single(role: Role) -> Self {
        Self(role.bit())
    }

    pub fn insert(&mut self, role: Role) {
        self.0 |= role.bit();
    }

    pub fn union(self, other: RoleSet) -> Self {
        Self(self.0 | other.0)
    }

    pub fn contains(self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Role> {
        Role::ALL.into_iter().filter(move |r| self.contains(*r))
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        let mut set = RoleSet::default();
        for role in iter {
            set.insert(role);
        }
        set
    }
}

impl Serialize for RoleSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// The four structural lightness pairs the constraint table learns gaps for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RolePair {
    BackgroundSurface,
    SurfaceOverlay,
    OverlayText,
    BackgroundText,
}

impl RolePair {
    pub const ALL: [RolePair; 4] = [
        RolePair::BackgroundSurface,
        RolePair::SurfaceOverlay,
        RolePair::OverlayText,
        RolePair::BackgroundText,
    ];

    pub fn key(self) -> &'static str {
        match self {
            RolePair::BackgroundSurface => "background→surface",
            RolePair::SurfaceOverlay => "surface→overlay",
            RolePair::OverlayText => "overlay→text",
            RolePair::BackgroundText => "background→text",
        }
    }

    /// ASCII spelling accepted as an alias of [`RolePair::key`].
    pub fn ascii_key(self) -> &'static str {
        match self {
            RolePair::BackgroundSurface => "background->surface",
            RolePair::SurfaceOverlay => "surface->overlay",
            RolePair::OverlayText => "overlay->text",
            RolePair::BackgroundText => "background->text",
        }
    }

    /// The structural elements whose lightness the pair compares.
    pub fn elements(self) -> (Element, Element) {
        match self {
            RolePair::BackgroundSurface => (Element::Base, Element::Surface1),
            RolePair::SurfaceOverlay => (Element::Surface1, Element::Overlay1),
            RolePair::OverlayText => (Element::Overlay1, Element::Text),
            RolePair::BackgroundText => (Element::Base, Element::Text),
        }
    }
}

impl fmt::Display for RolePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    Base,
    Mantle,
    Crust,
    Surface0,
    Surface1,
    Surface2,
    Overlay0,
    Overlay1,
    Overlay2,
    Text,
    Subtext0,
    Subtext1,
    Rosewater,
    Flamingo,
    Pink,
    Red,
    Maroon,
    Peach,
    Yellow,
    Green,
    Blue,
    Sapphire,
    Sky,
    Lavender,
    Teal,
    Mauve,
}

impl Element {
    pub const COUNT: usize = 26;

    /// Every element in canonical order (role by role).
    pub fn all() -> impl Iterator<Item = Element> {
        Role::ALL.into_iter().flat_map(|r| r.elements().iter().copied())
    }

    /// The structural anchors chosen together by the structural assigner.
    pub const ANCHORS: [Element; 4] = [
        Element::Base,
        Element::Surface1,
        Element::Overlay1,
        Element::Text,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn role(self) -> Role {
        use Element::*;
        match self {
            Base | Mantle | Crust => Role::Background,
            Surface0 | Surface1 | Surface2 => Role::Surface,
            Overlay0 | Overlay1 | Overlay2 => Role::Overlay,
            Text | Subtext0 | Subtext1 => Role::Text,
            Rosewater | Flamingo | Pink | Red | Maroon => Role::AccentRed,
            Peach | Yellow | Green => Role::AccentWarm,
            Blue | Sapphire | Sky | Lavender | Teal => Role::AccentCool,
            Mauve => Role::AccentBridge,
        }
    }

    /// Anchor element and learned-offset key for UI elements positioned
    /// relative to a structural anchor (e.g. mantle = base.L + offset).
    pub fn offset_anchor(self) -> Option<(Element, &'static str)> {
        use Element::*;
        match self {
            Mantle => Some((Base, "mantle_from_base")),
            Crust => Some((Base, "crust_from_base")),
            Surface0 => Some((Surface1, "surface0_from_surface1")),
            Surface2 => Some((Surface1, "surface2_from_surface1")),
            Overlay0 => Some((Overlay1, "overlay0_from_overlay1")),
            Overlay2 => Some((Overlay1, "overlay2_from_overlay1")),
            Subtext1 => Some((Text, "subtext1_from_text")),
            Subtext0 => Some((Text, "subtext0_from_text")),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        use Element::*;
        match self {
            Base => "base",
            Mantle => "mantle",
            Crust => "crust",
            Surface0 => "surface0",
            Surface1 => "surface1",
            Surface2 => "surface2",
            Overlay0 => "overlay0",
            Overlay1 => "overlay1",
            Overlay2 => "overlay2",
            Text => "text",
            Subtext0 => "subtext0",
            Subtext1 => "subtext1",
            Rosewater => "rosewater",
            Flamingo => "flamingo",
            Pink => "pink",
            Red => "red",
            Maroon => "maroon",
            Peach => "peach",
            Yellow => "yellow",
            Green => "green",
            Blue => "blue",
            Sapphire => "sapphire",
            Sky => "sky",
            Lavender => "lavender",
            Teal => "teal",
            Mauve => "mauve",
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every offset key the constraint table must provide.
pub fn offset_keys() -> impl Iterator<Item = &'static str> {
    Element::all().filter_map(|e| e.offset_anchor().map(|(_, key)| key))
}
