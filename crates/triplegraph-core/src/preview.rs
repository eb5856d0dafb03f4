//! Dry-run import into an in-memory graph.

use crate::engine::{run, ImportSummary};
use crate::error::ImportFailure;
use crate::loader::StatementLoader;
use crate::model::Statement;
use crate::store::{snapshot_node, GraphStore, MemoryGraphStore, NodeSnapshot, Relationship};
use serde::Serialize;
use triplegraph_config::{CommitSize, ImportConfig};

/// What a load would produce, without touching a persistent store.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub nodes: Vec<NodeSnapshot>,
    pub relationships: Vec<Relationship>,
    pub summary: ImportSummary,
}

/// Map at most `limit` statements onto a fresh in-memory graph.
///
/// The whole preview is applied as a single flush.
pub fn preview<I>(
    statements: I,
    config: &ImportConfig,
    limit: Option<usize>,
) -> Result<Preview, ImportFailure<ImportSummary>>
where
    I: IntoIterator<Item = Statement>,
{
    let config = ImportConfig {
        commit_size: CommitSize::Unbounded,
        ..config.clone()
    };
    let mut loader = StatementLoader::new(MemoryGraphStore::new(), &config)
        .map_err(|e| ImportFailure::new(ImportSummary::default(), e))?;

    let limit = limit.unwrap_or(usize::MAX);
    let summary = run(&mut loader, statements.into_iter().take(limit))?;

    let store = loader.into_store();
    let collect = || -> Result<Preview, crate::store::StoreError> {
        let nodes = store
            .nodes()?
            .into_iter()
            .map(|id| snapshot_node(&store, id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Preview {
            nodes,
            relationships: store.all_relationships()?,
            summary: summary.clone(),
        })
    };
    collect().map_err(|e| ImportFailure::new(summary.clone(), e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{vocab, Literal, Resource, Term};
    use triplegraph_config::VocabUriMode;

    fn statements() -> Vec<Statement> {
        vec![
            Statement::new(
                Resource::iri("http://example.org/a"),
                vocab::RDF_TYPE,
                Term::iri("http://example.org/Person"),
            ),
            Statement::new(
                Resource::iri("http://example.org/a"),
                "http://example.org/knows",
                Term::iri("http://example.org/b"),
            ),
            Statement::new(
                Resource::iri("http://example.org/b"),
                "http://example.org/name",
                Literal::string("Bo"),
            ),
        ]
    }

    #[test]
    fn test_preview_builds_graph_in_one_flush() {
        let config = ImportConfig {
            handle_vocab_uris: VocabUriMode::Ignore,
            commit_size: CommitSize::Every(1),
            ..Default::default()
        };
        let preview = preview(statements(), &config, None).unwrap();

        assert_eq!(preview.nodes.len(), 2);
        assert_eq!(preview.relationships.len(), 1);
        assert_eq!(preview.summary.flushes, 1);
        assert_eq!(preview.summary.triples_mapped, 3);
    }

    #[test]
    fn test_preview_respects_limit() {
        let preview = preview(statements(), &ImportConfig::default(), Some(1)).unwrap();

        assert_eq!(preview.summary.triples_parsed, 1);
        assert_eq!(preview.nodes.len(), 1);
        assert!(preview.nodes[0].labels.contains("ns0__Person"));
    }
}
