//! Name resolution: turning full IRIs into labels, property keys and
//! relationship types.
//!
//! ```text
//! http://schema.org/Person ──SHORTEN──▶ sch__Person
//!                          ──IGNORE───▶ Person
//!                          ──MAP──────▶ mappings[iri] or IGNORE
//!                          ──KEEP─────▶ http://schema.org/Person
//! ```

use crate::model::vocab;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, warn};
use triplegraph_config::VocabUriMode;

/// Separator between prefix and local name in shortened names.
pub const PREFIX_SEPARATOR: &str = "__";

/// Separator between a literal's text and its datatype in typed strings.
pub const DATATYPE_SEPARATOR: &str = "^^";

/// Namespaces that always use a fixed prefix.
const STANDARD_NAMESPACES: &[(&str, &str)] = &[
    ("sch", "http://schema.org/"),
    ("dc", "http://purl.org/dc/elements/1.1/"),
    ("dct", "http://purl.org/dc/terms/"),
    ("skos", "http://www.w3.org/2004/02/skos/core#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
    ("owl", "http://www.w3.org/2002/07/owl#"),
    ("rdf", vocab::RDF_NS),
    ("sh", "http://www.w3.org/ns/shacl#"),
    ("xsd", vocab::XSD_NS),
];

fn standard_prefix_for(namespace: &str) -> Option<&'static str> {
    STANDARD_NAMESPACES
        .iter()
        .find(|(_, ns)| *ns == namespace)
        .map(|(prefix, _)| *prefix)
}

fn standard_namespace_for(prefix: &str) -> Option<&'static str> {
    STANDARD_NAMESPACES
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, ns)| *ns)
}

/// Split an IRI into namespace and local name.
///
/// The split point is the last `#`, else the last `/`, else the last `:`.
pub fn split_iri(iri: &str) -> (&str, &str) {
    let idx = iri
        .rfind('#')
        .or_else(|| iri.rfind('/'))
        .or_else(|| iri.rfind(':'));
    match idx {
        Some(i) => (&iri[..=i], &iri[i + 1..]),
        None => ("", iri),
    }
}

/// What a resolved name will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Relationship,
    Label,
    Property,
    Datatype,
}

/// Prefix table errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamespaceError {
    #[error("'{prefix}' is a reserved prefix for <{namespace}>")]
    ReservedPrefix { prefix: String, namespace: String },

    #[error("<{namespace}> is a standard namespace with the prefix '{prefix}'")]
    StandardNamespace { namespace: String, prefix: String },

    #[error("prefix '{prefix}' is already in use for <{namespace}>")]
    PrefixInUse { prefix: String, namespace: String },

    #[error("namespace <{namespace}> already has the prefix '{prefix}'")]
    NamespaceHasPrefix { namespace: String, prefix: String },

    #[error("unknown prefix '{0}'")]
    UnknownPrefix(String),
}

/// Two-way namespace ↔ prefix table.
///
/// Entries added since the last [`take_unsaved`](Self::take_unsaved) are
/// tracked so the flush engine can persist them with the batch.
#[derive(Debug, Clone, Default)]
pub struct NamespacePrefixTable {
    prefix_to_ns: BTreeMap<String, String>,
    ns_to_prefix: HashMap<String, String>,
    unsaved: Vec<(String, String)>,
}

impl NamespacePrefixTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from persisted entries. Loaded entries are not unsaved.
    pub fn from_entries<I>(entries: I) -> Result<Self, NamespaceError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut table = Self::new();
        for (prefix, namespace) in entries {
            table.add(&prefix, &namespace)?;
        }
        table.unsaved.clear();
        Ok(table)
    }

    pub fn prefix_for(&self, namespace: &str) -> Option<&str> {
        self.ns_to_prefix.get(namespace).map(String::as_str)
    }

    pub fn namespace_for(&self, prefix: &str) -> Option<&str> {
        self.prefix_to_ns.get(prefix).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.prefix_to_ns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefix_to_ns.is_empty()
    }

    /// `(prefix, namespace)` pairs ordered by prefix.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefix_to_ns
            .iter()
            .map(|(p, ns)| (p.as_str(), ns.as_str()))
    }

    /// Register `prefix` for `namespace`.
    ///
    /// Re-adding an identical pair is a no-op.
    pub fn add(&mut self, prefix: &str, namespace: &str) -> Result<(), NamespaceError> {
        if let Some(reserved) = standard_namespace_for(prefix) {
            if reserved != namespace {
                return Err(NamespaceError::ReservedPrefix {
                    prefix: prefix.to_string(),
                    namespace: reserved.to_string(),
                });
            }
        }
        if let Some(standard) = standard_prefix_for(namespace) {
            if standard != prefix {
                return Err(NamespaceError::StandardNamespace {
                    namespace: namespace.to_string(),
                    prefix: standard.to_string(),
                });
            }
        }
        if let Some(existing) = self.prefix_to_ns.get(prefix) {
            if existing == namespace {
                return Ok(());
            }
            return Err(NamespaceError::PrefixInUse {
                prefix: prefix.to_string(),
                namespace: existing.clone(),
            });
        }
        if let Some(existing) = self.ns_to_prefix.get(namespace) {
            return Err(NamespaceError::NamespaceHasPrefix {
                namespace: namespace.to_string(),
                prefix: existing.clone(),
            });
        }

        self.prefix_to_ns
            .insert(prefix.to_string(), namespace.to_string());
        self.ns_to_prefix
            .insert(namespace.to_string(), prefix.to_string());
        self.unsaved.push((prefix.to_string(), namespace.to_string()));
        Ok(())
    }

    /// Prefix for `namespace`, minting one if it is new.
    ///
    /// Standard namespaces get their standard prefix, anything else gets the
    /// next free `ns<N>`.
    pub fn get_or_mint(&mut self, namespace: &str) -> Result<String, NamespaceError> {
        if let Some(prefix) = self.ns_to_prefix.get(namespace) {
            return Ok(prefix.clone());
        }

        let prefix = match standard_prefix_for(namespace) {
            Some(prefix) => prefix.to_string(),
            None => {
                let mut n = self
                    .prefix_to_ns
                    .keys()
                    .filter(|p| p.starts_with("ns"))
                    .count();
                while self.prefix_to_ns.contains_key(&format!("ns{}", n)) {
                    n += 1;
                }
                format!("ns{}", n)
            }
        };

        debug!(prefix = %prefix, namespace = %namespace, "Minted namespace prefix");
        self.add(&prefix, namespace)?;
        Ok(prefix)
    }

    /// Drain the entries added since the last call.
    pub fn take_unsaved(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.unsaved)
    }

    /// Put back entries whose persistence failed.
    pub fn restore_unsaved(&mut self, entries: Vec<(String, String)>) {
        let mut entries = entries;
        entries.append(&mut self.unsaved);
        self.unsaved = entries;
    }

    /// Reverse a shortened `prefix__local` name into a full IRI.
    pub fn expand(&self, short: &str) -> Result<String, NamespaceError> {
        let Some((prefix, local)) = short.split_once(PREFIX_SEPARATOR) else {
            return Err(NamespaceError::UnknownPrefix(short.to_string()));
        };
        self.namespace_for(prefix)
            .map(|ns| format!("{}{}", ns, local))
            .ok_or_else(|| NamespaceError::UnknownPrefix(prefix.to_string()))
    }
}

/// Resolves IRIs to graph names under one vocabulary mode.
#[derive(Debug, Clone)]
pub struct NameResolver {
    mode: VocabUriMode,
    naming_convention: bool,
    mappings: HashMap<String, String>,
    dropped_type_mapping: bool,
}

impl NameResolver {
    /// Create a resolver. A mapping for `rdf:type` is dropped with a warning.
    pub fn new<I>(mode: VocabUriMode, naming_convention: bool, mappings: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut mappings: HashMap<String, String> = mappings.into_iter().collect();
        let dropped_type_mapping = mappings.remove(vocab::RDF_TYPE).is_some();
        if dropped_type_mapping {
            warn!("Ignoring mapping for rdf:type, it is handled by the rdf:type mode");
        }
        Self {
            mode,
            naming_convention,
            mappings,
            dropped_type_mapping,
        }
    }

    pub fn mode(&self) -> VocabUriMode {
        self.mode
    }

    pub fn dropped_type_mapping(&self) -> bool {
        self.dropped_type_mapping
    }

    /// Resolve `iri` to the name used for an element of `kind`.
    pub fn resolve(
        &self,
        iri: &str,
        kind: ElementKind,
        prefixes: &mut NamespacePrefixTable,
    ) -> Result<String, NamespaceError> {
        match self.mode {
            VocabUriMode::Shorten => {
                let (namespace, local) = split_iri(iri);
                let prefix = prefixes.get_or_mint(namespace)?;
                Ok(format!("{}{}{}", prefix, PREFIX_SEPARATOR, local))
            }
            VocabUriMode::Keep => Ok(iri.to_string()),
            VocabUriMode::Ignore | VocabUriMode::Map if kind == ElementKind::Datatype => {
                Ok(iri.to_string())
            }
            VocabUriMode::Ignore => Ok(self.local_name(iri, kind)),
            VocabUriMode::Map => Ok(self
                .mappings
                .get(iri)
                .cloned()
                .unwrap_or_else(|| self.local_name(iri, kind))),
        }
    }

    fn local_name(&self, iri: &str, kind: ElementKind) -> String {
        let (_, local) = split_iri(iri);
        if !self.naming_convention {
            return local.to_string();
        }
        match kind {
            ElementKind::Relationship => local.to_uppercase(),
            ElementKind::Label => capitalize(local),
            ElementKind::Property => lower_first(local),
            ElementKind::Datatype => local.to_string(),
        }
    }
}

/// A resolver together with the prefix table it mints into.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    resolver: NameResolver,
    prefixes: NamespacePrefixTable,
}

impl Vocabulary {
    pub fn new(resolver: NameResolver, prefixes: NamespacePrefixTable) -> Self {
        Self { resolver, prefixes }
    }

    pub fn name(&mut self, iri: &str, kind: ElementKind) -> Result<String, NamespaceError> {
        self.resolver.resolve(iri, kind, &mut self.prefixes)
    }

    /// `lexical^^datatype`, with the datatype shortened under SHORTEN.
    pub fn typed_string(&mut self, lexical: &str, datatype: &str) -> Result<String, NamespaceError> {
        let datatype = self.name(datatype, ElementKind::Datatype)?;
        Ok(format!("{}{}{}", lexical, DATATYPE_SEPARATOR, datatype))
    }

    pub fn resolver(&self) -> &NameResolver {
        &self.resolver
    }

    pub fn prefixes(&self) -> &NamespacePrefixTable {
        &self.prefixes
    }

    pub fn prefixes_mut(&mut self) -> &mut NamespacePrefixTable {
        &mut self.prefixes
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
