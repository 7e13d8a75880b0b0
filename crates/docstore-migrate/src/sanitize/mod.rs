//! De-identification of sensitive fields.
//!
//! [`DocumentSanitizer`] walks a document depth-first and replaces every field
//! whose lower-cased name matches a rule with a synthetic value of the rule's
//! [`SyntheticKind`]. A matching field is replaced as a whole, even if it holds
//! a nested structure. If a generator fails the field becomes [`REDACTED`].
//!
//! The `id` field and partition key fields are never touched; mappings that
//! lie on a partition key path are recursed into instead of replaced.
//!
//! Values are generated from an RNG seeded with a digest of the document id
//! and the field path, so the same document always sanitizes to the same
//! output. That keeps repeated sanitized migrations idempotent.

mod generators;

pub use generators::{SynthesisError, SyntheticKind};

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::core::{Document, PartitionKeySpec, ID_FIELD};

/// Marker written when a synthetic value cannot be produced.
pub const REDACTED: &str = "REDACTED";

/// Field-name → generator table. Keys are lower-case.
#[derive(Debug, Clone)]
pub struct SanitizationRules {
    rules: HashMap<String, SyntheticKind>,
}

impl Default for SanitizationRules {
    fn default() -> Self {
        use SyntheticKind::*;

        let table = [
            ("firstname", FirstName),
            ("lastname", LastName),
            ("fullname", FullName),
            ("name", FullName),
            ("ssn", Ssn),
            ("phonenumber", PhoneNumber),
            ("mobilenumber", PhoneNumber),
            ("email", Email),
            ("workemail", CompanyEmail),
            ("personalemail", FreeEmail),
            ("address", Address),
            ("street", StreetAddress),
            ("city", City),
            ("state", State),
            ("postalcode", PostalCode),
            ("zip", PostalCode),
            ("jobtitle", JobTitle),
            ("department", Department),
            ("dateofbirth", DateOfBirth),
            ("managerid", Uuid),
            ("insurance", Insurance),
            ("taxid", Ssn),
            ("accountname", Company),
            ("accountnumber", AccountNumber),
            ("routingnumber", RoutingNumber),
            ("line1", StreetAddress),
            ("line2", SecondaryAddress),
            ("countyname", City),
            ("countyfips", CountyFips),
            ("ratingarea", RatingArea),
            ("payrate", PayRate),
        ];

        Self {
            rules: table
                .into_iter()
                .map(|(name, kind)| (name.to_string(), kind))
                .collect(),
        }
    }
}

impl SanitizationRules {
    /// An empty table.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Add or override a rule. Matching is case-insensitive.
    pub fn with_rule(mut self, field: &str, kind: SyntheticKind) -> Self {
        self.rules.insert(field.to_lowercase(), kind);
        self
    }

    /// Extend with additional rules.
    pub fn extend<'a, I>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a SyntheticKind)>,
    {
        for (field, kind) in extra {
            self.rules.insert(field.to_lowercase(), *kind);
        }
        self
    }

    /// Rule for a field name, if any.
    pub fn lookup(&self, field: &str) -> Option<SyntheticKind> {
        self.rules.get(&field.to_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Replaces sensitive fields with synthetic values.
#[derive(Debug, Clone, Default)]
pub struct DocumentSanitizer {
    rules: SanitizationRules,
}

impl DocumentSanitizer {
    pub fn new(rules: SanitizationRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &SanitizationRules {
        &self.rules
    }

    /// Return a sanitized copy of `doc`. The input is not modified.
    pub fn sanitize(&self, doc: &Document, partition_key: &PartitionKeySpec) -> Document {
        let mut protected: Vec<String> = partition_key.paths.clone();
        protected.push(format!("/{}", ID_FIELD));

        let walk = Walk {
            rules: &self.rules,
            protected: &protected,
            doc_id: doc.id().unwrap_or_default(),
        };

        let mut out = doc.clone();
        let replaced = walk.visit_map(out.fields_mut(), "");
        if replaced > 0 {
            debug!(
                "Sanitized {} field(s) in document {}",
                replaced,
                walk.doc_id
            );
        }
        out
    }
}

struct Walk<'a> {
    rules: &'a SanitizationRules,
    protected: &'a [String],
    doc_id: &'a str,
}

impl Walk<'_> {
    fn visit_map(&self, map: &mut Map<String, Value>, parent: &str) -> usize {
        let mut replaced = 0;
        for (key, value) in map.iter_mut() {
            let path = format!("{}/{}", parent, key);

            if self.is_protected(&path) {
                continue;
            }

            if !self.is_key_ancestor(&path) {
                if let Some(kind) = self.rules.lookup(key) {
                    *value = self.synthesize(kind, &path);
                    replaced += 1;
                    continue;
                }
            }

            replaced += self.visit_value(value, &path);
        }
        replaced
    }

    fn visit_value(&self, value: &mut Value, path: &str) -> usize {
        match value {
            Value::Object(map) => self.visit_map(map, path),
            Value::Array(items) => items
                .iter_mut()
                .enumerate()
                .map(|(idx, item)| self.visit_value(item, &format!("{}/{}", path, idx)))
                .sum(),
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => 0,
        }
    }

    fn is_protected(&self, path: &str) -> bool {
        self.protected.iter().any(|p| p == path)
    }

    fn is_key_ancestor(&self, path: &str) -> bool {
        self.protected
            .iter()
            .any(|p| p.len() > path.len() && p.starts_with(path) && p.as_bytes()[path.len()] == b'/')
    }

    fn synthesize(&self, kind: SyntheticKind, path: &str) -> Value {
        let mut rng = field_rng(self.doc_id, path);
        match kind.generate(&mut rng) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    "Document {}: could not synthesize '{}': {}; writing {}",
                    self.doc_id, path, e, REDACTED
                );
                Value::String(REDACTED.to_string())
            }
        }
    }
}

/// RNG seeded from the document id and field path.
fn field_rng(doc_id: &str, path: &str) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(doc_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(path.as_bytes());
    let digest = hasher.finalize();
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    StdRng::from_seed(seed)
}
