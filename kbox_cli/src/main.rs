#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;
extern crate loggerv;
extern crate libc;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use std::path::{Path, PathBuf};
use std::process;

use kbox_cli::apply::{apply, ApplyOptions, DEFAULT_ROLLOUT_TIMEOUT};
use kbox_cli::cluster::kube_cluster::KubeCluster;
use kbox_cli::prune::{prune, PruneOptions};
use kbox_cli::render::{load_config, render, render_multi_config};
use kbox_cli::rollback::{rollback, RollbackOptions};
use kbox_cli::validate::validate;
use kbox_cli::{preview, release, Error};
use kbox_filebacked::Loaded;

/// Prints a raw message to stderr. Stays silent in JSON mode, since the
/// caller already emitted the single JSON envelope there.
fn eprint_hinted(e: &Error) {
    error!("{}", e);
    for cause in e.iter().skip(1) {
        warn!("caused by: {}", cause);
    }
}

fn main() {
    let app = App::new("kbox")
        .version(crate_version!())
        .setting(AppSettings::VersionlessSubcommands)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .setting(AppSettings::ColoredHelp)
        .setting(AppSettings::DeriveDisplayOrder)
        .about("Turns a kbox.yaml and/or Dockerfile into Kubernetes resources, applies them, and tracks releases")
        .arg(Arg::with_name("verbose").short("v").multiple(true).help("Increase verbosity"))
        .arg(Arg::with_name("debug").short("d").long("debug").help("Adds line numbers to log statements"))
        .arg(Arg::with_name("json").long("json").global(true).help("Emit a single JSON result envelope instead of text"))

        .subcommand(SubCommand::with_name("render")
            .about("Render a manifest into Kubernetes YAML without touching a cluster")
            .arg(dir_arg())
            .arg(environment_arg()))

        .subcommand(SubCommand::with_name("validate")
            .about("Validate a manifest")
            .arg(dir_arg())
            .arg(environment_arg())
            .arg(Arg::with_name("strict").long("strict").help("Promote warnings to failures")))

        .subcommand(SubCommand::with_name("apply")
            .about("Render, apply, and optionally prune a manifest's resources in the cluster")
            .arg(dir_arg())
            .arg(environment_arg())
            .arg(context_arg())
            .arg(Arg::with_name("no-wait").long("no-wait").help("Skip waiting for the workload rollout to complete"))
            .arg(Arg::with_name("timeout").long("timeout").takes_value(true).help("Rollout wait timeout in seconds (default 300)"))
            .arg(Arg::with_name("prune").long("prune").help("Prune orphaned resources after a successful apply")))

        .subcommand(SubCommand::with_name("prune")
            .about("Delete cluster objects labelled for this app but absent from the rendered bundle")
            .arg(dir_arg())
            .arg(environment_arg())
            .arg(context_arg())
            .arg(Arg::with_name("dry-run").long("dry-run").help("Report what would be deleted without deleting")))

        .subcommand(SubCommand::with_name("rollback")
            .about("Roll an app back to a previous (or explicit) release revision")
            .arg(app_arg())
            .arg(namespace_arg())
            .arg(context_arg())
            .arg(Arg::with_name("to-revision").long("to-revision").takes_value(true).help("Target revision (defaults to the previous one)"))
            .arg(Arg::with_name("dry-run").long("dry-run").help("Report the rollback plan without applying it")))

        .subcommand(SubCommand::with_name("release")
            .setting(AppSettings::SubcommandRequiredElseHelp)
            .about("Inspect release history")
            .subcommand(SubCommand::with_name("list").arg(app_arg()).arg(namespace_arg()).arg(context_arg())
                .about("List retained release revisions"))
            .subcommand(SubCommand::with_name("get").arg(app_arg()).arg(namespace_arg()).arg(context_arg())
                .arg(Arg::with_name("revision").required(true).help("Revision number"))
                .about("Show one release revision")))

        .subcommand(SubCommand::with_name("preview")
            .setting(AppSettings::SubcommandRequiredElseHelp)
            .about("Create, destroy, and list per-branch preview environments")
            .subcommand(SubCommand::with_name("create").arg(app_arg()).arg(context_arg())
                .arg(Arg::with_name("name").required(true).help("Preview name"))
                .about("Create a preview namespace"))
            .subcommand(SubCommand::with_name("destroy").arg(app_arg()).arg(context_arg())
                .arg(Arg::with_name("name").required(true).help("Preview name"))
                .about("Destroy a preview namespace"))
            .subcommand(SubCommand::with_name("list").arg(app_arg()).arg(context_arg())
                .about("List preview namespaces for an app")));

    let args = app.get_matches();
    let json = args.is_present("json");

    loggerv::Logger::new()
        .verbosity(args.occurrences_of("verbose") + 1)
        .module_path(true)
        .line_numbers(args.is_present("debug"))
        .init()
        .unwrap();

    // Ignore SIGPIPE errors so `kbox render | head` doesn't panic.
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    let runtime = tokio::runtime::Runtime::new().expect("failed to start the async runtime");
    let outcome = runtime.block_on(dispatch(&args));

    match outcome {
        Ok(value) => {
            if json {
                println!("{}", serde_json::json!({ "success": true, "result": value }));
            }
            process::exit(0);
        }
        Err(CliFailure::Validation(report)) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "success": false, "errors": report.errors, "warnings": report.warnings })
                );
            } else {
                eprint!("{}", report.render_text());
            }
            process::exit(1);
        }
        Err(CliFailure::Error(e)) => {
            if json {
                println!("{}", serde_json::json!({ "success": false, "error": e.to_string() }));
            } else {
                eprint_hinted(&e);
            }
            process::exit(1);
        }
    }
}

enum CliFailure {
    Validation(kbox_cli::validate::ValidationReport),
    Error(Error),
}

impl From<Error> for CliFailure {
    fn from(e: Error) -> Self { CliFailure::Error(e) }
}

fn dir_arg() -> Arg<'static, 'static> {
    Arg::with_name("dir").long("dir").takes_value(true).default_value(".").help("Manifest directory")
}
fn environment_arg() -> Arg<'static, 'static> {
    Arg::with_name("environment").short("e").long("environment").takes_value(true).help("Named environment overlay to apply")
}
fn context_arg() -> Arg<'static, 'static> {
    Arg::with_name("context").long("context").takes_value(true).help("kubeconfig context override")
}
fn app_arg() -> Arg<'static, 'static> {
    Arg::with_name("app").long("app").takes_value(true).required(true).help("Application name")
}
fn namespace_arg() -> Arg<'static, 'static> {
    Arg::with_name("namespace").long("namespace").takes_value(true).default_value("default").help("Target namespace")
}

fn resolve_dir(args: &ArgMatches) -> PathBuf {
    Path::new(args.value_of("dir").unwrap_or(".")).to_path_buf()
}

async fn dispatch(args: &ArgMatches<'_>) -> Result<serde_json::Value, CliFailure> {
    if let Some(a) = args.subcommand_matches("render") {
        return cmd_render(a).await;
    }
    if let Some(a) = args.subcommand_matches("validate") {
        return cmd_validate(a).await;
    }
    if let Some(a) = args.subcommand_matches("apply") {
        return cmd_apply(a).await;
    }
    if let Some(a) = args.subcommand_matches("prune") {
        return cmd_prune(a).await;
    }
    if let Some(a) = args.subcommand_matches("rollback") {
        return cmd_rollback(a).await;
    }
    if let Some(a) = args.subcommand_matches("release") {
        if let Some(b) = a.subcommand_matches("list") {
            return cmd_release_list(b).await;
        }
        if let Some(b) = a.subcommand_matches("get") {
            return cmd_release_get(b).await;
        }
    }
    if let Some(a) = args.subcommand_matches("preview") {
        if let Some(b) = a.subcommand_matches("create") {
            return cmd_preview_create(b).await;
        }
        if let Some(b) = a.subcommand_matches("destroy") {
            return cmd_preview_destroy(b).await;
        }
        if let Some(b) = a.subcommand_matches("list") {
            return cmd_preview_list(b).await;
        }
    }
    unreachable!("clap guarantees a subcommand was required")
}

async fn cmd_render(a: &ArgMatches<'_>) -> Result<serde_json::Value, CliFailure> {
    let dir = resolve_dir(a);
    let loaded = load_config(&dir, a.value_of("environment")).map_err(to_cli_error)?;
    let bundle = match &loaded {
        Loaded::Single(cfg) => render(cfg).map_err(to_cli_error)?,
        Loaded::Multi(multi) => render_multi_config(multi).map_err(to_cli_error)?,
    };
    let yaml = bundle.to_yaml().map_err(to_cli_error)?;
    println!("{}", yaml);
    Ok(serde_json::json!({ "objects": bundle.sorted().iter().map(|o| o.key().to_string()).collect::<Vec<_>>() }))
}

async fn cmd_validate(a: &ArgMatches<'_>) -> Result<serde_json::Value, CliFailure> {
    let dir = resolve_dir(a);
    let loaded = load_config(&dir, a.value_of("environment")).map_err(to_cli_error)?;
    let report = validate(&loaded);
    let strict = a.is_present("strict");
    let ok = if strict { report.is_ok_strict() } else { report.is_ok() };
    if !ok {
        return Err(CliFailure::Validation(report));
    }
    Ok(serde_json::json!({ "warnings": report.warnings }))
}

async fn cmd_apply(a: &ArgMatches<'_>) -> Result<serde_json::Value, CliFailure> {
    let dir = resolve_dir(a);
    let loaded = load_config(&dir, a.value_of("environment")).map_err(to_cli_error)?;
    let (app, namespace, bundle) = match &loaded {
        Loaded::Single(cfg) => (cfg.name.clone(), cfg.namespace.clone(), render(cfg).map_err(to_cli_error)?),
        Loaded::Multi(multi) => (multi.name.clone(), multi.namespace.clone(), render_multi_config(multi).map_err(to_cli_error)?),
    };

    let cluster = connect(a).await?;
    let timeout = a
        .value_of("timeout")
        .map(|s| std::time::Duration::from_secs(s.parse().unwrap_or(DEFAULT_ROLLOUT_TIMEOUT.as_secs())))
        .unwrap_or(DEFAULT_ROLLOUT_TIMEOUT);
    let opts = ApplyOptions { no_wait: a.is_present("no-wait"), timeout };
    let outcome = apply(&cluster, &namespace, &bundle, &opts).await.map_err(to_cli_error)?;

    if let Loaded::Single(cfg) = &loaded {
        if let Err(e) = release::save(&cluster, &namespace, &app, cfg).await {
            warn!("release history was not recorded: {}", e);
        }
    }

    let mut pruned = None;
    if a.is_present("prune") {
        let prune_outcome = prune(&cluster, &namespace, &app, &bundle, &PruneOptions::default()).await.map_err(to_cli_error)?;
        pruned = Some(serde_json::json!({
            "deleted": prune_outcome.deleted.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
            "errors": prune_outcome.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        }));
    }

    Ok(serde_json::json!({
        "created": outcome.created.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
        "updated": outcome.updated.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
        "errors": outcome.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        "pruned": pruned,
    }))
}

async fn cmd_prune(a: &ArgMatches<'_>) -> Result<serde_json::Value, CliFailure> {
    let dir = resolve_dir(a);
    let loaded = load_config(&dir, a.value_of("environment")).map_err(to_cli_error)?;
    let (app, namespace, bundle) = match &loaded {
        Loaded::Single(cfg) => (cfg.name.clone(), cfg.namespace.clone(), render(cfg).map_err(to_cli_error)?),
        Loaded::Multi(multi) => (multi.name.clone(), multi.namespace.clone(), render_multi_config(multi).map_err(to_cli_error)?),
    };
    let cluster = connect(a).await?;
    let opts = PruneOptions { dry_run: a.is_present("dry-run") };
    let outcome = prune(&cluster, &namespace, &app, &bundle, &opts).await.map_err(to_cli_error)?;
    Ok(serde_json::json!({
        "deleted": outcome.deleted.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
        "errors": outcome.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
    }))
}

async fn cmd_rollback(a: &ArgMatches<'_>) -> Result<serde_json::Value, CliFailure> {
    let app = a.value_of("app").unwrap();
    let namespace = a.value_of("namespace").unwrap();
    let cluster = connect(a).await?;
    let opts = RollbackOptions {
        to_revision: a.value_of("to-revision").and_then(|s| s.parse().ok()),
        dry_run: a.is_present("dry-run"),
    };
    let result = rollback(&cluster, namespace, app, &opts).await.map_err(to_cli_error)?;
    Ok(serde_json::json!({
        "fromRevision": result.from_revision,
        "toRevision": result.to_revision,
        "newRevision": result.new_revision,
        "image": result.image,
    }))
}

async fn cmd_release_list(a: &ArgMatches<'_>) -> Result<serde_json::Value, CliFailure> {
    let app = a.value_of("app").unwrap();
    let namespace = a.value_of("namespace").unwrap();
    let cluster = connect(a).await?;
    let releases = release::list(&cluster, namespace, app).await.map_err(to_cli_error)?;
    Ok(serde_json::json!(releases
        .iter()
        .map(|r| serde_json::json!({ "revision": r.revision, "timestamp": r.timestamp, "image": r.image }))
        .collect::<Vec<_>>()))
}

async fn cmd_release_get(a: &ArgMatches<'_>) -> Result<serde_json::Value, CliFailure> {
    let app = a.value_of("app").unwrap();
    let namespace = a.value_of("namespace").unwrap();
    let revision: u32 = a.value_of("revision").unwrap().parse().map_err(|_| {
        CliFailure::Error(kbox_cli::with_hint("revision must be a positive integer", "Check the argument"))
    })?;
    let cluster = connect(a).await?;
    let r = release::get(&cluster, namespace, app, revision).await.map_err(to_cli_error)?;
    Ok(serde_json::to_value(&r).map_err(|e| CliFailure::Error(kbox_cli::with_hint(e, "Check YAML syntax")))?)
}

async fn cmd_preview_create(a: &ArgMatches<'_>) -> Result<serde_json::Value, CliFailure> {
    let app = a.value_of("app").unwrap();
    let name = a.value_of("name").unwrap();
    let cluster = connect(a).await?;
    let info = preview::create(&cluster, app, name).await.map_err(to_cli_error)?;
    Ok(serde_json::to_value(&info).map_err(|e| CliFailure::Error(kbox_cli::with_hint(e, "Check YAML syntax")))?)
}

async fn cmd_preview_destroy(a: &ArgMatches<'_>) -> Result<serde_json::Value, CliFailure> {
    let app = a.value_of("app").unwrap();
    let name = a.value_of("name").unwrap();
    let cluster = connect(a).await?;
    preview::destroy(&cluster, app, name).await.map_err(to_cli_error)?;
    Ok(serde_json::json!({ "destroyed": name }))
}

async fn cmd_preview_list(a: &ArgMatches<'_>) -> Result<serde_json::Value, CliFailure> {
    let app = a.value_of("app").unwrap();
    let cluster = connect(a).await?;
    let list = preview::list(&cluster, app).await.map_err(to_cli_error)?;
    Ok(serde_json::to_value(&list).map_err(|e| CliFailure::Error(kbox_cli::with_hint(e, "Check YAML syntax")))?)
}

async fn connect(a: &ArgMatches<'_>) -> Result<KubeCluster, CliFailure> {
    KubeCluster::connect(a.value_of("context"))
        .await
        .map_err(|e| CliFailure::Error(kbox_cli::with_hint(e, "Run 'kbox doctor'")))
}

fn to_cli_error<E: Into<Error>>(e: E) -> CliFailure { CliFailure::Error(e.into()) }
