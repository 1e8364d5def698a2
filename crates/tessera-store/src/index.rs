//! Mapper-file layouts and their text codec.
//!
//! A mapper file is a newline-separated list of records with `,` between
//! fields and no escaping. Three layouts exist:
//!
//! | layout | header | record |
//! |---|---|---|
//! | [`IndexLayout::Sequenced`] | last issued sequence number | `name,sequence,rtti,filename` |
//! | [`IndexLayout::Asset`] | none | `name,filename` |
//! | [`IndexLayout::Typed`] | none | `name,rtti,filename` |
//!
//! Parsing is lenient: records with the wrong field count, or fields that do
//! not parse, are skipped with a warning so one corrupt line never hides the
//! rest of the family.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tessera_core::identity::{EntityId, TypeTag};

use crate::StoreError;

const FIELD_SEPARATOR: char = ',';
const RECORD_SEPARATORS: [char; 2] = ['\n', '\r'];

/// Record layout of a mapper file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexLayout {
    /// Sequence header plus full identity per record.
    Sequenced,
    /// Name and filename only. Every id is an origin id of the family's
    /// default type.
    Asset,
    /// Name, type and filename. Every id is an origin id.
    Typed,
}

impl IndexLayout {
    /// Whether the layout persists the sequence counter.
    pub fn carries_sequence(self) -> bool {
        matches!(self, IndexLayout::Sequenced)
    }

    fn field_count(self) -> usize {
        match self {
            IndexLayout::Sequenced => 4,
            IndexLayout::Asset => 2,
            IndexLayout::Typed => 3,
        }
    }

    /// Check that a record can be written and read back unchanged.
    ///
    /// Layouts without a sequence field only hold origin ids, and the asset
    /// layout only holds ids of the family's `default_type`.
    pub fn validate(self, id: &EntityId, filename: &str, default_type: &TypeTag) -> Result<(), StoreError> {
        let invalid = |details: String| StoreError::InvalidRecord {
            name: id.name().to_owned(),
            details,
        };
        if !self.carries_sequence() && !id.is_origin() {
            return Err(invalid(format!(
                "{self:?} layout cannot record sequence {}",
                id.sequence()
            )));
        }
        if self == IndexLayout::Asset && id.rtti() != default_type {
            return Err(invalid(format!(
                "type '{}' would reload as '{default_type}'",
                id.rtti()
            )));
        }
        let mut fields = vec![("name", id.name()), ("filename", filename)];
        if self != IndexLayout::Asset {
            fields.push(("type", id.rtti().as_str()));
        }
        for (label, value) in fields {
            if value.is_empty() {
                return Err(invalid(format!("empty {label}")));
            }
            if value.contains(FIELD_SEPARATOR) || value.contains(RECORD_SEPARATORS) {
                return Err(invalid(format!("{label} '{value}' contains a separator")));
            }
        }
        Ok(())
    }

    /// Parse mapper-file text. Never fails; corrupt records are skipped.
    pub fn parse(self, text: &str, default_type: &TypeTag) -> Index {
        let mut lines = text
            .split(RECORD_SEPARATORS)
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .peekable();

        let mut index = Index::default();
        if self.carries_sequence() {
            // Files written without a header start straight with a record.
            if let Some(seq) = lines.peek().and_then(|header| header.parse::<u64>().ok()) {
                index.sequence = seq;
                lines.next();
            }
        }

        for line in lines {
            let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
            if fields.len() != self.field_count() {
                tracing::warn!(
                    line,
                    expected = self.field_count(),
                    found = fields.len(),
                    "skipping mapper record with wrong field count"
                );
                continue;
            }
            let parsed = match self {
                IndexLayout::Sequenced => {
                    EntityId::from_tokens(&fields[..3]).map(|id| (id, fields[3]))
                }
                IndexLayout::Asset => Ok((EntityId::new(fields[0], default_type.clone()), fields[1])),
                IndexLayout::Typed => Ok((EntityId::new(fields[0], fields[1]), fields[2])),
            };
            match parsed {
                Ok((id, filename)) if !id.name().is_empty() && !filename.is_empty() => {
                    index.sequence = index.sequence.max(id.sequence());
                    index.records.insert(id, filename.to_owned());
                }
                Ok(_) => tracing::warn!(line, "skipping mapper record with empty field"),
                Err(e) => tracing::warn!(line, error = %e, "skipping malformed mapper record"),
            }
        }
        index
    }

    /// Render the full mapper-file text for `index`.
    pub fn render(self, index: &Index) -> String {
        let mut out = String::new();
        if self.carries_sequence() {
            let _ = writeln!(out, "{}", index.sequence);
        }
        for (id, filename) in &index.records {
            let _ = match self {
                IndexLayout::Sequenced => writeln!(
                    out,
                    "{},{},{},{filename}",
                    id.name(),
                    id.sequence(),
                    id.rtti()
                ),
                IndexLayout::Asset => writeln!(out, "{},{filename}", id.name()),
                IndexLayout::Typed => writeln!(out, "{},{},{filename}", id.name(), id.rtti()),
            };
        }
        out
    }
}

/// In-memory image of one mapper file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    /// Last issued sequence number. Only persisted by sequenced layouts.
    pub sequence: u64,
    /// Record per id, ordered so the rendered file is deterministic.
    pub records: BTreeMap<EntityId, String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
