//! Change detection between two status snapshots
//!
//! Named fields are compared first, in table order. Raw bytes are then
//! compared independently so that bits nobody has named yet still show up.

use crate::envelope::HW_STATUS_LEN;
use crate::status::{BitSpec, HwStatus, StatusField};
use crate::{bits_of, bool_label};
use serde::Serialize;
use std::fmt;

/// A single difference between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    /// A named field changed value
    Field {
        name: String,
        label: String,
        old: bool,
        new: bool,
    },
    /// A raw response byte changed value
    Byte { index: usize, old: u8, new: u8 },
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Field {
                label, old, new, ..
            } => write!(f, "{}: {} → {}", label, bool_label(*old), bool_label(*new)),
            Change::Byte { index, old, new } => write!(
                f,
                "byte[{}]: 0x{:02x} ({}) → 0x{:02x} ({})",
                index,
                old,
                bits_of(*old),
                new,
                bits_of(*new)
            ),
        }
    }
}

/// Ordered list of differences between a previous and a current snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeRecord(Vec<Change>);

impl ChangeRecord {
    /// Compare two snapshots using the built-in bit table
    pub fn between(previous: &HwStatus, current: &HwStatus) -> Self {
        Self::between_with(previous, current, &[])
    }

    /// Compare two snapshots, also checking operator-defined `extra` bits
    ///
    /// Extra bits are reported after the built-in fields and before raw bytes.
    pub fn between_with(previous: &HwStatus, current: &HwStatus, extra: &[BitSpec]) -> Self {
        let mut changes = Vec::new();

        for field in StatusField::ALL {
            let (old, new) = (previous.get(field), current.get(field));
            if old != new {
                changes.push(field_change(field.spec(), old, new));
            }
        }

        for spec in extra {
            let (old, new) = (previous.evaluate(spec), current.evaluate(spec));
            if old != new {
                changes.push(field_change(spec, old, new));
            }
        }

        for index in 0..HW_STATUS_LEN {
            let (old, new) = (previous.byte(index), current.byte(index));
            if old != new {
                changes.push(Change::Byte { index, old, new });
            }
        }

        Self(changes)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.0.iter()
    }

    /// Named-field entries only
    pub fn fields(&self) -> impl Iterator<Item = &Change> {
        self.0.iter().filter(|c| matches!(c, Change::Field { .. }))
    }

    /// Raw-byte entries only
    pub fn bytes(&self) -> impl Iterator<Item = &Change> {
        self.0.iter().filter(|c| matches!(c, Change::Byte { .. }))
    }

    /// Render each entry as one line
    pub fn lines(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl<'a> IntoIterator for &'a ChangeRecord {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn field_change(spec: &BitSpec, old: bool, new: bool) -> Change {
    Change::Field {
        name: spec.name.to_string(),
        label: spec.label.to_string(),
        old,
        new,
    }
}

/// Compare two snapshots with the built-in bit table
pub fn diff(previous: &HwStatus, current: &HwStatus) -> ChangeRecord {
    ChangeRecord::between(previous, current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(b3: u8, b4: u8) -> HwStatus {
        let mut buf = [0u8; 12];
        buf[3] = b3;
        buf[4] = b4;
        HwStatus::decode(&buf)
    }

    #[test]
    fn test_no_change() {
        let s = status(0x80, 0x00);
        assert!(diff(&s, &s).is_empty());
    }

    #[test]
    fn test_scan_button_release() {
        let pressed = status(0x00, 0x01);
        let released = status(0x00, 0x00);
        let record = diff(&pressed, &released);

        let lines = record.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "scan button: True → False");
        assert_eq!(
            lines[1],
            "byte[4]: 0x01 (00000001) → 0x00 (00000000)"
        );
    }

    #[test]
    fn test_fields_before_bytes() {
        // paper inserted and button pressed at once
        let before = status(0x80, 0x00);
        let after = status(0x00, 0x01);
        let record = diff(&before, &after);

        let kinds: Vec<_> = record
            .iter()
            .map(|c| match c {
                Change::Field { name, .. } => name.clone(),
                Change::Byte { index, .. } => format!("byte{}", index),
            })
            .collect();
        assert_eq!(kinds, vec!["hopper", "scan_sw", "byte3", "byte4"]);
    }

    #[test]
    fn test_unmapped_bit_reported_as_byte_only() {
        let before = status(0x80, 0x00);
        let after = status(0x80, 0x20);
        let record = diff(&before, &after);
        assert_eq!(record.fields().count(), 0);
        assert_eq!(record.bytes().count(), 1);
    }

    #[test]
    fn test_extra_bits_between_fields_and_bytes() {
        let held = BitSpec {
            name: "scan_held".into(),
            label: "scan button held".into(),
            byte: 4,
            bit: 5,
            inverted: false,
        };
        let before = status(0x80, 0x00);
        let after = status(0x80, 0x21);
        let record = ChangeRecord::between_with(&before, &after, std::slice::from_ref(&held));

        let lines = record.lines();
        assert_eq!(lines[0], "scan button: False → True");
        assert_eq!(lines[1], "scan button held: False → True");
        assert!(lines[2].starts_with("byte[4]"));
    }

    #[test]
    fn test_short_snapshot_compares_missing_as_zero() {
        let short = HwStatus::decode(&[0x01]);
        let full = HwStatus::decode(&[0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x02]);
        let record = diff(&short, &full);
        assert_eq!(record.len(), 1);
        assert_eq!(record.lines()[0], "byte[11]: 0x00 (00000000) → 0x02 (00000010)");
    }
}
