//! Parser output: an ordered list of labelled, typed fields.

use std::fmt;

/// Display base for numeric fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    Dec,
    /// Hexadecimal, zero-padded to `digits`.
    Hex { digits: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Numeric { value: u64, base: Base },
    /// Set bits rendered by name. `names[n]` labels bit `n`.
    Bitfield { value: u32, names: Vec<&'static str> },
    ListData {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => f.write_str(s),
            FieldValue::Numeric {
                value,
                base: Base::Dec,
            } => write!(f, "{value}"),
            FieldValue::Numeric {
                value,
                base: Base::Hex { digits },
            } => write!(f, "0x{:0width$X}", value, width = *digits as usize),
            FieldValue::Bitfield { value, names } => {
                let set: Vec<&str> = names
                    .iter()
                    .enumerate()
                    .filter(|(bit, name)| {
                        *bit < 32 && *value & (1u32 << *bit) != 0 && !name.is_empty()
                    })
                    .map(|(_, name)| *name)
                    .collect();
                if set.is_empty() {
                    f.write_str("(none)")
                } else {
                    f.write_str(&set.join(", "))
                }
            }
            FieldValue::ListData { headers, rows } => {
                writeln!(f, "{}", headers.join(" | "))?;
                for row in rows {
                    writeln!(f, "{}", row.join(" | "))?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

/// Ordered field list. Insertion order is display order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RomFields {
    fields: Vec<Field>,
}

impl RomFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.push(Field {
            name: name.into(),
            value,
        });
    }

    pub fn add_string(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.push(name, FieldValue::String(value.into()));
    }

    pub fn add_dec(&mut self, name: impl Into<String>, value: u64) {
        self.push(
            name,
            FieldValue::Numeric {
                value,
                base: Base::Dec,
            },
        );
    }

    pub fn add_hex(&mut self, name: impl Into<String>, value: u64, digits: u8) {
        self.push(
            name,
            FieldValue::Numeric {
                value,
                base: Base::Hex { digits },
            },
        );
    }

    pub fn add_bitfield(&mut self, name: impl Into<String>, value: u32, names: &[&'static str]) {
        self.push(
            name,
            FieldValue::Bitfield {
                value,
                names: names.to_vec(),
            },
        );
    }

    pub fn add_list(
        &mut self,
        name: impl Into<String>,
        headers: &[&str],
        rows: Vec<Vec<String>>,
    ) {
        self.push(
            name,
            FieldValue::ListData {
                headers: headers.iter().map(|h| h.to_string()).collect(),
                rows,
            },
        );
    }

    /// Non-fatal problem found while filling in fields.
    pub fn add_warning(&mut self, reason: impl fmt::Display) {
        self.add_string("Warning", format!("Warning: {reason}"));
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter_map(|field| match &field.value {
            FieldValue::String(s) if field.name == "Warning" => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Image slots a container can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    /// Large icon (48x48 SMDH, or 32x32 for DS titles).
    Icon,
    /// Small icon (24x24 SMDH).
    IconSmall,
}
