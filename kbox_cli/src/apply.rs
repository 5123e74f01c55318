//! The apply engine: `Apply(ctx, bundle) -> {created, updated,
//! errors}`, followed by an optional rollout-wait poll.
//!
//! Every object in `bundle.sorted()` order is server-side applied
//! through the [`Cluster`] trait; a failure on one object is recorded in
//! `errors` rather than aborting the batch. Rollout health is judged by
//! `observedGeneration` and replica counts rather than an `Available`
//! condition, so it degrades gracefully against a Deployment whose
//! controller hasn't reported conditions yet.

use std::time::Duration;

use tokio::time::Instant;

use kbox_definitions::bundle::{Bundle, ObjectKey};

use crate::cluster::{Cluster, CrudError};
use crate::Result;

/// The rollout-wait default: 5 minutes, overridable per call.
pub const DEFAULT_ROLLOUT_TIMEOUT: Duration = Duration::from_secs(300);

const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug)]
pub struct ApplyOptions {
    /// Skip the post-apply rollout wait entirely.
    pub no_wait: bool,
    pub timeout: Duration,
}

impl Default for ApplyOptions {
    fn default() -> Self { ApplyOptions { no_wait: false, timeout: DEFAULT_ROLLOUT_TIMEOUT } }
}

#[derive(Clone, Debug, Default)]
pub struct ApplyOutcome {
    pub created: Vec<ObjectKey>,
    pub updated: Vec<ObjectKey>,
    pub errors: Vec<CrudError>,
}

/// `Apply(ctx, bundle, opts) -> {created[], updated[], errors[]}`.
pub async fn apply(cluster: &dyn Cluster, namespace: &str, bundle: &Bundle, opts: &ApplyOptions) -> Result<ApplyOutcome> {
    let mut outcome = ApplyOutcome::default();

    for object in bundle.sorted() {
        match cluster.apply_object(namespace, object).await {
            Ok(true) => outcome.updated.push(object.key()),
            Ok(false) => outcome.created.push(object.key()),
            Err(e) => {
                outcome.errors.push(CrudError { kind: object.kind(), name: object.name().to_string(), message: e.to_string() });
            }
        }
    }

    if !opts.no_wait {
        if let Some(deployment) = bundle.deployment() {
            let name = deployment.metadata.name.clone().unwrap_or_default();
            wait_for_rollout(cluster, namespace, &name, opts.timeout).await?;
        }
    }

    Ok(outcome)
}

/// `WaitForRollout(ctx, ns, name, timeout) -> error`:
/// polls `observedGeneration`/replica counts every 5s until
/// [`DeploymentStatus::rolled_out`] or `timeout` elapses.
pub async fn wait_for_rollout(cluster: &dyn Cluster, namespace: &str, name: &str, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    loop {
        if start.elapsed() >= timeout {
            let timed_out: kbox_definitions::Error =
                kbox_definitions::ErrorKind::Timeout(format!("Deployment/{}", name), timeout.as_secs()).into();
            return Err(timed_out.into());
        }
        if let Some(status) = cluster.deployment_status(namespace, name).await? {
            if status.rolled_out() {
                return Ok(());
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
    use k8s_openapi::api::core::v1::Service;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kbox_definitions::bundle::{BundleBuilder, Kind, Object};

    use crate::cluster::fake::FakeCluster;

    fn service(name: &str) -> Object {
        Object::Service(Box::new(Service {
            metadata: ObjectMeta { name: Some(name.to_string()), ..Default::default() },
            ..Default::default()
        }))
    }

    fn deployment(name: &str, replicas: i32) -> Object {
        Object::Deployment(Box::new(Deployment {
            metadata: ObjectMeta { name: Some(name.to_string()), ..Default::default() },
            spec: Some(DeploymentSpec { replicas: Some(replicas), ..Default::default() }),
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn first_apply_reports_created_second_reports_updated() {
        let cluster = FakeCluster::new(Utc.ymd(2026, 1, 1).and_hms(0, 0, 0));
        let mut b = BundleBuilder::new();
        b.push(service("demo"));
        let bundle = b.build();

        let first = apply(&cluster, "demo", &bundle, &ApplyOptions { no_wait: true, ..Default::default() }).await.unwrap();
        assert_eq!(first.created, vec![ObjectKey { kind: Kind::Service, name: "demo".into() }]);
        assert!(first.updated.is_empty());

        let second = apply(&cluster, "demo", &bundle, &ApplyOptions { no_wait: true, ..Default::default() }).await.unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.updated, vec![ObjectKey { kind: Kind::Service, name: "demo".into() }]);
    }

    #[tokio::test(start_paused = true)]
    async fn no_wait_skips_rollout_polling_even_with_a_slow_deployment() {
        let cluster = FakeCluster::new(Utc.ymd(2026, 1, 1).and_hms(0, 0, 0));
        cluster.set_settle_after("demo", "demo", 1000);
        let mut b = BundleBuilder::new();
        b.push(deployment("demo", 2));
        let bundle = b.build();

        let outcome = apply(&cluster, "demo", &bundle, &ApplyOptions { no_wait: true, ..Default::default() }).await.unwrap();
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_rollout_times_out_when_never_settled() {
        let cluster = FakeCluster::new(Utc.ymd(2026, 1, 1).and_hms(0, 0, 0));
        cluster.set_settle_after("demo", "demo", u32::MAX);
        let mut b = BundleBuilder::new();
        b.push(deployment("demo", 2));
        let bundle = b.build();
        cluster.apply_object("demo", bundle.sorted()[0]).await.unwrap();

        let err = wait_for_rollout(&cluster, "demo", "demo", Duration::from_secs(30)).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_rollout_succeeds_once_settled() {
        let cluster = FakeCluster::new(Utc.ymd(2026, 1, 1).and_hms(0, 0, 0));
        cluster.set_settle_after("demo", "demo", 0);
        let mut b = BundleBuilder::new();
        b.push(deployment("demo", 2));
        let bundle = b.build();
        cluster.apply_object("demo", bundle.sorted()[0]).await.unwrap();

        wait_for_rollout(&cluster, "demo", "demo", Duration::from_secs(1)).await.unwrap();
    }
}
