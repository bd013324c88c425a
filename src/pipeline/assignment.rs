use std::collections::HashSet;

use crate::color::Color;
use crate::constraints::Tier;
use crate::element::{Element, Polarity};
use crate::record::ColorRecord;

/// Hue rotations tried, in order, when a color collides with one already used.
const HUE_NUDGES: [f32; 8] = [8.0, -8.0, 16.0, -16.0, 24.0, -24.0, 32.0, -32.0];

/// The growing element → color mapping of one run, plus the set of colors
/// already taken. Every mutation goes through methods that keep the two in
/// step, so no two elements ever share a hex.
#[derive(Debug, Clone)]
pub struct Assignment {
    polarity: Polarity,
    structural_tier: Option<Tier>,
    slots: [Option<ColorRecord>; Element::COUNT],
    used: HashSet<Color>,
}

impl Assignment {
    pub fn new(polarity: Polarity) -> Self {
        Self {
            polarity,
            structural_tier: None,
            slots: std::array::from_fn(|_| None),
            used: HashSet::new(),
        }
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// Tier the structural assigner accepted its quadruple in.
    pub fn structural_tier(&self) -> Option<Tier> {
        self.structural_tier
    }

    pub fn set_structural_tier(&mut self, tier: Tier) {
        self.structural_tier = Some(tier);
    }

    pub fn get(&self, element: Element) -> Option<&ColorRecord> {
        self.slots[element.index()].as_ref()
    }

    pub fn contains(&self, element: Element) -> bool {
        self.slots[element.index()].is_some()
    }

    pub fn is_used(&self, color: Color) -> bool {
        self.used.contains(&color)
    }

    /// Assigned elements in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Element, &ColorRecord)> {
        Element::all().filter_map(|e| self.get(e).map(|r| (e, r)))
    }

    pub fn missing(&self) -> Vec<Element> {
        Element::all().filter(|e| !self.contains(*e)).collect()
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.len() == Element::COUNT
    }

    /// Assign `record` to an empty element. Returns `false`, leaving the
    /// assignment untouched, if the element is taken or the color is used.
    pub fn try_insert(&mut self, element: Element, record: ColorRecord) -> bool {
        if self.contains(element) || self.is_used(record.color()) {
            return false;
        }
        self.used.insert(record.color());
        self.slots[element.index()] = Some(record);
        true
    }

    /// Swap the color of an element for `record`. The element's old color
    /// does not count as a collision. On failure the old color stays.
    pub fn try_replace(&mut self, element: Element, record: ColorRecord) -> bool {
        let old = self.slots[element.index()].take();
        if let Some(old) = &old {
            self.used.remove(&old.color());
        }
        if self.is_used(record.color()) {
            if let Some(old) = old {
                self.used.insert(old.color());
                self.slots[element.index()] = Some(old);
            }
            return false;
        }
        self.used.insert(record.color());
        self.slots[element.index()] = Some(record);
        true
    }

    /// Insert (or replace, when `replace` is set) trying `record` first and
    /// then hue-nudged variants of it until one is unused. Returns the color
    /// that was placed, or `None` if every attempt collided.
    fn place_with_nudges(
        &mut self,
        element: Element,
        record: ColorRecord,
        replace: bool,
    ) -> Option<Color> {
        let attempt = |this: &mut Self, rec: ColorRecord| {
            let color = rec.color();
            let placed = if replace {
                this.try_replace(element, rec)
            } else {
                this.try_insert(element, rec)
            };
            placed.then_some(color)
        };

        if let Some(color) = attempt(self, record.clone()) {
            return Some(color);
        }
        for nudge in HUE_NUDGES {
            let shifted = record.with_hue_shift(nudge);
            let variant = record.synthesize(shifted.lab(), element.role());
            if let Some(color) = attempt(self, variant) {
                tracing::debug!(%element, nudge, "resolved color collision by hue shift");
                return Some(color);
            }
        }
        tracing::warn!(%element, color = %record.color(), "unresolved color collision");
        None
    }

    /// Insert `record`, hue-nudging it on collision.
    pub fn insert_distinct(&mut self, element: Element, record: ColorRecord) -> Option<Color> {
        self.place_with_nudges(element, record, false)
    }

    /// Replace an element's color, hue-nudging the new color on collision.
    pub fn replace_distinct(&mut self, element: Element, record: ColorRecord) -> Option<Color> {
        self.place_with_nudges(element, record, true)
    }
}
