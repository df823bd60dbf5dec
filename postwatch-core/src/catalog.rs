//! Walks `root → author → date` on the remote store and produces the set of
//! documents to watch.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::CatalogError;
use crate::model::{
    DOCX_MIME, FOLDER_MIME, JPEG_MIME, NATIVE_DOC_MIME, RemoteItem, Resource,
    ResourceKey,
};
use crate::remote::{ListQuery, RemoteStore, list_all};

#[derive(Debug, Clone)]
pub struct CatalogOptions {
    /// Name of the top-level folder holding one folder per author.
    pub root_folder: String,
    pub document_types: Vec<String>,
    pub asset_types: Vec<String>,
}

impl CatalogOptions {
    pub fn new(root_folder: impl Into<String>) -> Self {
        Self {
            root_folder: root_folder.into(),
            document_types: vec![DOCX_MIME.to_string(), NATIVE_DOC_MIME.to_string()],
            asset_types: vec![JPEG_MIME.to_string()],
        }
    }
}

/// Why a date folder did not make it into the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Expected exactly one primary document.
    DocumentCount(usize),
    /// Listing the folder failed.
    Listing(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// `author` or `author/date`.
    pub path: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub resources: Vec<Resource>,
    pub skipped: Vec<SkippedEntry>,
}

impl Catalog {
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

pub struct CatalogBuilder {
    store: Arc<dyn RemoteStore>,
    options: CatalogOptions,
}

impl std::fmt::Debug for CatalogBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogBuilder")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl CatalogBuilder {
    pub fn new(store: Arc<dyn RemoteStore>, options: CatalogOptions) -> Self {
        Self { store, options }
    }

    /// Enumerate every author and date folder under the root.
    ///
    /// Only a missing or unlistable root is an error; problems further down
    /// the tree are logged and recorded in [`Catalog::skipped`].
    pub async fn build(&self) -> Result<Catalog, CatalogError> {
        let root = self.locate_root().await?;
        info!(root = %root.name, id = %root.id, "found root folder");

        let mut catalog = Catalog::default();

        let authors = match self.child_folders(&root).await {
            Ok(authors) => authors,
            Err(err) => {
                return Err(CatalogError::RootListing {
                    name: root.name,
                    source: err,
                });
            }
        };

        for author in authors {
            debug!(author = %author.name, "listing posts for author");
            let dates = match self.child_folders(&author).await {
                Ok(dates) => dates,
                Err(err) => {
                    error!(author = %author.name, error = %err, "failed to list date folders");
                    catalog.skipped.push(SkippedEntry {
                        path: author.name.clone(),
                        reason: SkipReason::Listing(err.to_string()),
                    });
                    continue;
                }
            };

            for date in dates {
                let key = ResourceKey::new(&author.name, &date.name);
                match self.resolve_post(&key, &date).await {
                    Ok(resource) => catalog.resources.push(resource),
                    Err(reason) => catalog.skipped.push(SkippedEntry {
                        path: key.to_string(),
                        reason,
                    }),
                }
            }
        }

        info!(
            resources = catalog.resources.len(),
            skipped = catalog.skipped.len(),
            "catalog built"
        );
        Ok(catalog)
    }

    async fn locate_root(&self) -> Result<RemoteItem, CatalogError> {
        let query = ListQuery::named(&self.options.root_folder).with_mime(FOLDER_MIME);
        let mut matches = list_all(self.store.as_ref(), &query)
            .await
            .map_err(|source| CatalogError::RootListing {
                name: self.options.root_folder.clone(),
                source,
            })?;

        if matches.len() > 1 {
            warn!(
                root = %self.options.root_folder,
                count = matches.len(),
                "multiple root folders found, using the first"
            );
        }

        if matches.is_empty() {
            return Err(CatalogError::RootNotFound(self.options.root_folder.clone()));
        }
        Ok(matches.swap_remove(0))
    }

    async fn child_folders(
        &self,
        parent: &RemoteItem,
    ) -> crate::error::Result<Vec<RemoteItem>> {
        let query = ListQuery::children_of(&parent.id).with_mime(FOLDER_MIME);
        list_all(self.store.as_ref(), &query).await
    }

    async fn resolve_post(
        &self,
        key: &ResourceKey,
        folder: &RemoteItem,
    ) -> Result<Resource, SkipReason> {
        let mut documents = self
            .children_of_type(folder, &self.options.document_types)
            .await
            .map_err(|err| {
                error!(post = %key, error = %err, "failed to list post documents");
                SkipReason::Listing(err.to_string())
            })?;

        if documents.len() != 1 {
            error!(
                post = %key,
                actual = documents.len(),
                expected = 1,
                "unexpected number of post documents"
            );
            return Err(SkipReason::DocumentCount(documents.len()));
        }
        let document = documents.swap_remove(0);

        let asset = match self.children_of_type(folder, &self.options.asset_types).await {
            Ok(mut assets) if assets.len() == 1 => Some(assets.swap_remove(0)),
            Ok(assets) if assets.is_empty() => None,
            Ok(assets) => {
                warn!(post = %key, count = assets.len(), "ambiguous cover image, ignoring");
                None
            }
            Err(err) => {
                warn!(post = %key, error = %err, "failed to list cover images");
                None
            }
        };

        debug!(post = %key, document = %document.name, "resolved post");
        Ok(Resource {
            key: key.clone(),
            document,
            asset,
        })
    }

    async fn children_of_type(
        &self,
        parent: &RemoteItem,
        types: &[String],
    ) -> crate::error::Result<Vec<RemoteItem>> {
        let query = ListQuery {
            parent: Some(parent.id.clone()),
            name: None,
            mime_types: types.to_vec(),
        };
        list_all(self.store.as_ref(), &query).await
    }
}
