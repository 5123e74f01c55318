//! The rollback engine: re-renders a past release's `Config`
//! against current renderer rules, applies it, waits for rollout, and
//! records the result as a brand-new revision. Rollback never mutates
//! or deletes prior history.

use kbox_definitions::release::{latest, previous};
use kbox_definitions::Release;

use crate::apply::{apply, ApplyOptions};
use crate::cluster::Cluster;
use crate::release::{get, load_releases, save};
use crate::render::render;
use crate::Result;

fn unknown_revision(app: &str) -> crate::Error {
    kbox_definitions::Error::from(kbox_definitions::ErrorKind::UnknownRevision(app.to_string(), 0)).into()
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RollbackOptions {
    /// An explicit target revision; `None` means "the previous release".
    pub to_revision: Option<u32>,
    pub dry_run: bool,
}

#[derive(Clone, Debug)]
pub struct RollbackResult {
    pub from_revision: u32,
    pub to_revision: u32,
    pub new_revision: u32,
    pub image: String,
}

/// `Rollback(ctx, ns, app, {toRevision?, dryRun}) -> RollbackResult`.
pub async fn rollback(cluster: &dyn Cluster, namespace: &str, app: &str, opts: &RollbackOptions) -> Result<RollbackResult> {
    let releases = load_releases(cluster, namespace, app).await?;
    let current = latest(&releases).cloned().ok_or_else(|| unknown_revision(app))?;

    let target: Release = match opts.to_revision {
        Some(revision) => get(cluster, namespace, app, revision).await?,
        None => previous(&releases).cloned().ok_or_else(|| unknown_revision(app))?,
    };

    if opts.dry_run {
        return Ok(RollbackResult {
            from_revision: current.revision,
            to_revision: target.revision,
            new_revision: target.revision,
            image: target.image,
        });
    }

    let bundle = render(&target.config)?;
    apply(cluster, namespace, &bundle, &ApplyOptions::default()).await?;
    let new_revision = save(cluster, namespace, app, &target.config).await?;

    Ok(RollbackResult { from_revision: current.revision, to_revision: target.revision, new_revision, image: target.image })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kbox_definitions::Config;

    use crate::cluster::fake::FakeCluster;
    use crate::release::save as save_release;

    fn cfg(image: &str) -> Config { Config { name: "demo".to_string(), image: Some(image.to_string()), ..Config::default() } }

    #[tokio::test]
    async fn rollback_to_previous_renders_applies_and_records_a_new_revision() {
        let cluster = FakeCluster::new(Utc.ymd(2026, 1, 1).and_hms(0, 0, 0));
        save_release(&cluster, "demo", "demo", &cfg("demo:v1")).await.unwrap();
        save_release(&cluster, "demo", "demo", &cfg("demo:v2")).await.unwrap();

        let result = rollback(&cluster, "demo", "demo", &RollbackOptions::default()).await.unwrap();
        assert_eq!(result.from_revision, 2);
        assert_eq!(result.to_revision, 1);
        assert_eq!(result.new_revision, 3);
        assert_eq!(result.image, "demo:v1");

        let releases = crate::release::list(&cluster, "demo", "demo").await.unwrap();
        assert_eq!(releases.len(), 3);
        assert_eq!(releases[2].image, "demo:v1");
    }

    #[tokio::test]
    async fn rollback_to_explicit_revision() {
        let cluster = FakeCluster::new(Utc.ymd(2026, 1, 1).and_hms(0, 0, 0));
        save_release(&cluster, "demo", "demo", &cfg("demo:v1")).await.unwrap();
        save_release(&cluster, "demo", "demo", &cfg("demo:v2")).await.unwrap();
        save_release(&cluster, "demo", "demo", &cfg("demo:v3")).await.unwrap();

        let opts = RollbackOptions { to_revision: Some(1), dry_run: false };
        let result = rollback(&cluster, "demo", "demo", &opts).await.unwrap();
        assert_eq!(result.to_revision, 1);
        assert_eq!(result.image, "demo:v1");
    }

    #[tokio::test]
    async fn dry_run_does_not_record_a_new_revision() {
        let cluster = FakeCluster::new(Utc.ymd(2026, 1, 1).and_hms(0, 0, 0));
        save_release(&cluster, "demo", "demo", &cfg("demo:v1")).await.unwrap();
        save_release(&cluster, "demo", "demo", &cfg("demo:v2")).await.unwrap();

        let opts = RollbackOptions { to_revision: None, dry_run: true };
        let result = rollback(&cluster, "demo", "demo", &opts).await.unwrap();
        assert_eq!(result.new_revision, result.to_revision);
        assert_eq!(crate::release::list(&cluster, "demo", "demo").await.unwrap().len(), 2);
    }
}
