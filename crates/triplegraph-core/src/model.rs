//! Statement and identity types.
//!
//! A [`Statement`] is what the upstream parser hands to a sink: subject,
//! predicate, object and an optional graph context. Statements serialize to
//! one JSON object per line, which is the format the CLI reads.

use serde::{Deserialize, Serialize};

/// Well-known vocabulary IRIs.
pub mod vocab {
    pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
    pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
    pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

    pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";
    pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
    pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
    pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    pub const XSD_LONG: &str = "http://www.w3.org/2001/XMLSchema#long";
    pub const XSD_INT: &str = "http://www.w3.org/2001/XMLSchema#int";
    pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
    pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
    pub const XSD_FLOAT: &str = "http://www.w3.org/2001/XMLSchema#float";
    pub const XSD_DATE: &str = "http://www.w3.org/2001/XMLSchema#date";
    pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
}

/// Scheme used to give blank nodes an addressable identity on load.
pub const BNODE_PREFIX: &str = "bnode://";

/// Key used to find a node again across statements and batches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub uri: String,
    /// Graph context, only set for graph-scoped (quad) imports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<String>,
}

impl ResourceIdentity {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            graph: None,
        }
    }

    pub fn in_graph(uri: impl Into<String>, graph: Option<String>) -> Self {
        Self {
            uri: uri.into(),
            graph,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.uri.starts_with(BNODE_PREFIX)
    }
}

impl std::fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.graph {
            Some(graph) => write!(f, "<{}> in <{}>", self.uri, graph),
            None => write!(f, "<{}>", self.uri),
        }
    }
}

/// A subject or a non-literal object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Resource {
    Iri(String),
    Blank(String),
}

impl Resource {
    pub fn iri(value: impl Into<String>) -> Self {
        Self::Iri(value.into())
    }

    pub fn blank(id: impl Into<String>) -> Self {
        Self::Blank(id.into())
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Blank(_))
    }

    /// The identity this resource maps to; blank nodes get `bnode://<id>`.
    pub fn identity(&self, graph: Option<&str>) -> ResourceIdentity {
        let uri = match self {
            Self::Iri(iri) => iri.clone(),
            Self::Blank(id) => format!("{}{}", BNODE_PREFIX, id),
        };
        ResourceIdentity::in_graph(uri, graph.map(str::to_string))
    }
}

/// A typed or language-tagged literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Literal {
    #[serde(rename = "value")]
    pub lexical: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Literal {
    /// A plain `xsd:string` literal.
    pub fn string(lexical: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: Some(datatype.into()),
            language: None,
        }
    }

    pub fn lang(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: None,
            language: Some(language.into()),
        }
    }

    /// Effective datatype IRI.
    pub fn datatype(&self) -> &str {
        match (&self.datatype, &self.language) {
            (Some(dt), _) => dt,
            (None, Some(_)) => vocab::RDF_LANG_STRING,
            (None, None) => vocab::XSD_STRING,
        }
    }
}

/// Statement object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Term {
    Resource(Resource),
    Literal(Literal),
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Self::Resource(Resource::iri(value))
    }

    pub fn blank(id: impl Into<String>) -> Self {
        Self::Resource(Resource::blank(id))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Resource(Resource::Blank(_)))
    }
}

impl From<Resource> for Term {
    fn from(resource: Resource) -> Self {
        Self::Resource(resource)
    }
}

impl From<Literal> for Term {
    fn from(literal: Literal) -> Self {
        Self::Literal(literal)
    }
}

/// One fact in the source graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Statement {
    pub subject: Resource,
    pub predicate: String,
    pub object: Term,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<String>,
}

impl Statement {
    pub fn new(subject: Resource, predicate: impl Into<String>, object: impl Into<Term>) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object: object.into(),
            graph: None,
        }
    }

    /// Scope this statement to a named graph.
    pub fn in_graph(mut self, graph: impl Into<String>) -> Self {
        self.graph = Some(graph.into());
        self
    }

    pub fn involves_blank_node(&self) -> bool {
        self.subject.is_blank() || self.object.is_blank()
    }
}

/// An edge waiting for the next flush.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingEdge {
    pub from: ResourceIdentity,
    pub rel_type: String,
    pub to: ResourceIdentity,
}
