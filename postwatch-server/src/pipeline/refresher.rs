use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use postwatch_core::{RefreshError, RefreshStep, Refresher, RemoteStore, Resource};
use tokio::process::Command;
use tracing::{debug, info};

use super::template::{CommandTemplate, Placeholders};
use crate::infra::config::PipelineConfig;

/// Local locations for one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostPaths {
    pub doc_dir: PathBuf,
    pub document: PathBuf,
    pub asset: Option<PathBuf>,
    pub html_dir: PathBuf,
}

impl PostPaths {
    /// Folder and file names come from the remote store, so anything that
    /// could escape the configured roots is refused.
    pub fn resolve(config: &PipelineConfig, resource: &Resource) -> Result<Self, RefreshError> {
        let author = safe_component(&resource.key.author)?;
        let date = safe_component(&resource.key.date)?;
        let filename = safe_component(resource.filename())?;

        let doc_dir = config.docs_root.join(author).join(date);
        let asset = resource
            .asset
            .as_ref()
            .map(|asset| safe_component(&asset.name).map(|name| doc_dir.join(name)))
            .transpose()?;

        Ok(Self {
            document: doc_dir.join(filename),
            asset,
            html_dir: config.html_root.join(author).join(date),
            doc_dir,
        })
    }
}

fn safe_component(name: &str) -> Result<&str, RefreshError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains('\\') => Ok(name),
        _ => Err(RefreshError::new(
            RefreshStep::Prepare,
            format!("refusing unsafe path component '{name}'"),
        )),
    }
}

/// [`Refresher`] that writes the post to disk and runs the configured
/// commands in order.
pub struct PipelineRefresher {
    store: Arc<dyn RemoteStore>,
    config: PipelineConfig,
}

impl std::fmt::Debug for PipelineRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRefresher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PipelineRefresher {
    pub fn new(store: Arc<dyn RemoteStore>, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    async fn download_document(
        &self,
        resource: &Resource,
        paths: &PostPaths,
    ) -> Result<(), RefreshError> {
        let body = self
            .store
            .download(&resource.document)
            .await
            .map_err(|err| RefreshError::new(RefreshStep::Download, err.to_string()))?;

        tokio::fs::create_dir_all(&paths.doc_dir)
            .await
            .map_err(|err| io_failure(RefreshStep::Prepare, &paths.doc_dir, err))?;
        tokio::fs::write(&paths.document, body)
            .await
            .map_err(|err| io_failure(RefreshStep::Download, &paths.document, err))?;

        info!(post = %resource.key, path = %paths.document.display(), "saved post document");
        Ok(())
    }

    /// Cover images are only fetched once; later edits go unnoticed until the
    /// local copy is removed.
    async fn ensure_asset(
        &self,
        resource: &Resource,
        paths: &PostPaths,
    ) -> Result<(), RefreshError> {
        let (Some(asset), Some(path)) = (&resource.asset, &paths.asset) else {
            return Ok(());
        };

        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|err| io_failure(RefreshStep::Asset, path, err))?;
        if exists {
            debug!(post = %resource.key, path = %path.display(), "cover image already present");
            return Ok(());
        }

        let body = self
            .store
            .download(asset)
            .await
            .map_err(|err| RefreshError::new(RefreshStep::Asset, err.to_string()))?;
        tokio::fs::write(path, body)
            .await
            .map_err(|err| io_failure(RefreshStep::Asset, path, err))?;

        info!(post = %resource.key, path = %path.display(), "saved cover image");
        Ok(())
    }

    async fn run_step(
        &self,
        step: RefreshStep,
        template: Option<&CommandTemplate>,
        values: &Placeholders,
        resource: &Resource,
    ) -> Result<(), RefreshError> {
        let Some(template) = template else {
            return Ok(());
        };
        let argv = template.render(values);
        info!(post = %resource.key, %step, cmd = %argv.join(" "), "running pipeline step");

        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| RefreshError::new(step, format!("failed to start {}: {err}", argv[0])))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RefreshError::new(
                step,
                format!("{} exited with {}: {}", argv[0], output.status, stderr.trim()),
            ));
        }

        debug!(post = %resource.key, %step, stdout = %stdout.trim(), "pipeline step finished");
        Ok(())
    }
}

fn io_failure(step: RefreshStep, path: &Path, err: std::io::Error) -> RefreshError {
    RefreshError::new(step, format!("{}: {err}", path.display()))
}

#[async_trait]
impl Refresher for PipelineRefresher {
    async fn refresh(&self, resource: &Resource) -> Result<(), RefreshError> {
        let paths = PostPaths::resolve(&self.config, resource)?;

        self.download_document(resource, &paths).await?;
        self.ensure_asset(resource, &paths).await?;

        tokio::fs::create_dir_all(&paths.html_dir)
            .await
            .map_err(|err| io_failure(RefreshStep::Prepare, &paths.html_dir, err))?;

        let values = Placeholders {
            document: Placeholders::path(&paths.document),
            asset: paths.asset.as_deref().map(Placeholders::path).unwrap_or_default(),
            html_dir: Placeholders::path(&paths.html_dir),
            title: resource.title().to_string(),
            author: resource.key.author.clone(),
            date: resource.key.date.clone(),
        };

        self.run_step(RefreshStep::Convert, self.config.convert.as_ref(), &values, resource)
            .await?;
        if paths.asset.is_some() {
            self.run_step(
                RefreshStep::Thumbnail,
                self.config.thumbnail.as_ref(),
                &values,
                resource,
            )
            .await?;
        }
        self.run_step(
            RefreshStep::Regenerate,
            self.config.regenerate.as_ref(),
            &values,
            resource,
        )
        .await?;
        self.run_step(RefreshStep::Publish, self.config.publish.as_ref(), &values, resource)
            .await?;

        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use postwatch_core::testing::{FakeRemote, sample_resource};
    use tempfile::TempDir;

    fn sh(script: &str) -> Option<CommandTemplate> {
        CommandTemplate::new(vec!["sh".into(), "-c".into(), script.into()])
    }

    fn config(root: &TempDir) -> PipelineConfig {
        PipelineConfig {
            docs_root: root.path().join("drive"),
            html_root: root.path().join("html"),
            convert: None,
            thumbnail: None,
            regenerate: None,
            publish: None,
        }
    }

    fn remote_for(resource: &Resource) -> FakeRemote {
        let mut remote = FakeRemote::new().content(resource.document.id.as_str(), "docx-bytes");
        if let Some(asset) = &resource.asset {
            remote = remote.content(asset.id.as_str(), "jpeg-bytes");
        }
        remote
    }

    #[tokio::test]
    async fn document_and_asset_land_under_author_and_date() {
        let root = tempfile::tempdir().unwrap();
        let resource = sample_resource("alice", "2024-01-01");
        let remote = Arc::new(remote_for(&resource));
        let refresher = PipelineRefresher::new(remote.clone(), config(&root));

        refresher.refresh(&resource).await.unwrap();

        let doc_dir = root.path().join("drive/alice/2024-01-01");
        let document = std::fs::read(doc_dir.join(resource.filename())).unwrap();
        assert_eq!(document, b"docx-bytes");
        let asset_name = &resource.asset.as_ref().unwrap().name;
        assert_eq!(std::fs::read(doc_dir.join(asset_name)).unwrap(), b"jpeg-bytes");
        assert!(root.path().join("html/alice/2024-01-01").is_dir());
    }

    #[tokio::test]
    async fn existing_asset_is_not_downloaded_again() {
        let root = tempfile::tempdir().unwrap();
        let resource = sample_resource("alice", "2024-01-01");
        let remote = Arc::new(remote_for(&resource));
        let refresher = PipelineRefresher::new(remote.clone(), config(&root));

        refresher.refresh(&resource).await.unwrap();
        refresher.refresh(&resource).await.unwrap();

        let asset_id = resource.asset.as_ref().unwrap().id.clone();
        let asset_downloads = remote.downloads().iter().filter(|id| **id == asset_id).count();
        assert_eq!(asset_downloads, 1);
        assert_eq!(remote.downloads().len(), 3);
    }

    #[tokio::test]
    async fn steps_run_in_order_with_placeholders() {
        let root = tempfile::tempdir().unwrap();
        let log = root.path().join("steps.log");
        let log_arg = log.to_string_lossy().into_owned();
        let mut config = config(&root);
        config.convert = sh(&format!("echo \"convert $0 $1\" >> {log_arg}"))
            .map(|t| with_args(t, &["{title}", "{author}"]));
        config.thumbnail = sh(&format!("echo thumbnail >> {log_arg}"));
        config.regenerate = sh(&format!("echo regenerate >> {log_arg}"));
        config.publish = sh(&format!("echo publish >> {log_arg}"));

        let resource = sample_resource("alice", "2024-01-01");
        let refresher = PipelineRefresher::new(Arc::new(remote_for(&resource)), config);
        refresher.refresh(&resource).await.unwrap();

        let lines: Vec<String> = std::fs::read_to_string(&log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(
            lines,
            vec![
                format!("convert {} alice", resource.title()),
                "thumbnail".to_string(),
                "regenerate".to_string(),
                "publish".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn thumbnail_is_skipped_without_an_asset() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config(&root);
        config.thumbnail = sh("exit 7");

        let mut resource = sample_resource("bob", "2024-02-02");
        resource.asset = None;
        let refresher = PipelineRefresher::new(Arc::new(remote_for(&resource)), config);

        refresher.refresh(&resource).await.unwrap();
    }

    #[tokio::test]
    async fn failing_step_reports_stderr_and_stops_the_pipeline() {
        let root = tempfile::tempdir().unwrap();
        let marker = root.path().join("published");
        let mut config = config(&root);
        config.convert = sh("echo 'pandoc: bad docx' >&2; exit 3");
        config.publish = sh(&format!("touch {}", marker.display()));

        let resource = sample_resource("alice", "2024-01-01");
        let refresher = PipelineRefresher::new(Arc::new(remote_for(&resource)), config);

        let err = refresher.refresh(&resource).await.unwrap_err();
        assert_eq!(err.step, RefreshStep::Convert);
        assert!(err.diagnostic.contains("pandoc: bad docx"), "{}", err.diagnostic);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn missing_program_is_a_step_failure() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config(&root);
        config.regenerate = CommandTemplate::new(vec!["/nonexistent/gen_homepage".into()]);

        let resource = sample_resource("alice", "2024-01-01");
        let refresher = PipelineRefresher::new(Arc::new(remote_for(&resource)), config);

        let err = refresher.refresh(&resource).await.unwrap_err();
        assert_eq!(err.step, RefreshStep::Regenerate);
    }

    #[tokio::test]
    async fn download_failure_is_reported_as_download_step() {
        let root = tempfile::tempdir().unwrap();
        let resource = sample_resource("alice", "2024-01-01");
        let refresher = PipelineRefresher::new(Arc::new(FakeRemote::new()), config(&root));

        let err = refresher.refresh(&resource).await.unwrap_err();
        assert_eq!(err.step, RefreshStep::Download);
    }

    #[test]
    fn traversal_in_folder_names_is_refused() {
        let root = tempfile::tempdir().unwrap();
        let config = config(&root);
        for author in ["..", "a/b", ".", ""] {
            let resource = sample_resource(author, "2024-01-01");
            let err = PostPaths::resolve(&config, &resource).unwrap_err();
            assert_eq!(err.step, RefreshStep::Prepare, "author {author:?}");
        }
    }

    fn with_args(template: CommandTemplate, extra: &[&str]) -> CommandTemplate {
        let mut argv = template.render(&Placeholders::default());
        argv.extend(extra.iter().map(|s| s.to_string()));
        CommandTemplate::new(argv).unwrap()
    }
}
