//! Helm release tools
//!
//! Handlers shell out to the `helm` binary rather than reimplement its
//! release engine; repository cache/config paths come from configuration
//! and the tool's `context` argument maps to `--kube-context`.

use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use navarch_config::HelmConfig;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::process::Command;

use crate::context::ToolContext;
use crate::descriptor::{Capability, ParamType, ToolDescriptor, ToolParam};
use crate::error::ToolError;
use crate::toolset::{ToolSpec, Toolset};

pub fn toolset() -> Toolset {
    Toolset::open("helm", vec![
        ToolSpec::new(
            ToolDescriptor::new(
                "helm.list",
                "List Helm Releases",
                "List installed Helm releases",
                Capability::ReadOnly,
                vec![
                    ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
                    ToolParam::optional("namespace", ParamType::String, "Namespace; empty for all namespaces"),
                ],
            ),
            helm_list,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "helm.install",
                "Install Helm Chart",
                "Install or upgrade a chart as a named release",
                Capability::Destructive,
                vec![
                    ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
                    ToolParam::required("release", ParamType::String, "Release name"),
                    ToolParam::required("chart", ParamType::String, "Chart reference, e.g. bitnami/redis"),
                    ToolParam::optional("namespace", ParamType::String, "Namespace; defaults to `default`"),
                    ToolParam::optional("values", ParamType::Object, "Chart values overriding the defaults"),
                ],
            ).idempotent(),
            helm_install,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "helm.uninstall",
                "Uninstall Helm Release",
                "Uninstall a release and delete its resources",
                Capability::Destructive,
                vec![
                    ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
                    ToolParam::required("release", ParamType::String, "Release name"),
                    ToolParam::optional("namespace", ParamType::String, "Namespace; defaults to `default`"),
                ],
            ),
            helm_uninstall,
        ),
    ])
}

fn base_command(helm: &HelmConfig, context: &str) -> Command {
    let binary = helm.binary.as_deref().unwrap_or(Path::new("helm"));
    let mut cmd = Command::new(binary);
    if let Some(cache) = &helm.repository_cache {
        cmd.arg("--repository-cache").arg(cache);
    }
    if let Some(config) = &helm.repository_config {
        cmd.arg("--repository-config").arg(config);
    }
    if !context.is_empty() {
        cmd.arg("--kube-context").arg(context);
    }
    cmd
}

async fn run(mut cmd: Command) -> Result<String, ToolError> {
    let output = cmd
        .output()
        .await
        .map_err(|e| ToolError::Tool(format!("failed to run helm: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ToolError::Tool(format!(
            "helm exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[derive(Deserialize)]
struct HelmListArgs {
    #[serde(default)]
    context: String,
    #[serde(default)]
    namespace: String,
}

async fn helm_list(ctx: Arc<ToolContext>, args: HelmListArgs) -> Result<Value, ToolError> {
    let mut cmd = base_command(ctx.helm(), &args.context);
    cmd.arg("list").arg("-o").arg("json");
    if args.namespace.is_empty() {
        cmd.arg("--all-namespaces");
    } else {
        cmd.arg("-n").arg(&args.namespace);
    }

    let stdout = run(cmd).await?;
    let releases: Value =
        serde_json::from_str(&stdout).map_err(|e| ToolError::Tool(format!("unparseable helm output: {e}")))?;
    Ok(json!({ "releases": releases }))
}

#[derive(Deserialize)]
struct HelmInstallArgs {
    #[serde(default)]
    context: String,
    release: String,
    chart: String,
    #[serde(default = "super::default_namespace")]
    namespace: String,
    #[serde(default)]
    values: Option<Value>,
}

async fn helm_install(ctx: Arc<ToolContext>, args: HelmInstallArgs) -> Result<Value, ToolError> {
    // Helm stores releases in secrets; gate on writing them in the
    // release namespace before anything is shelled out.
    let cluster = ctx.cluster(&args.context).await?;
    ctx.authorize(&cluster, "create", "", "secrets", &args.namespace).await?;

    let mut cmd = base_command(ctx.helm(), &args.context);
    cmd.arg("upgrade")
        .arg("--install")
        .arg(&args.release)
        .arg(&args.chart)
        .arg("-n")
        .arg(&args.namespace)
        .arg("-o")
        .arg("json");

    // Values go through a file so arbitrary nesting survives; helm reads
    // JSON values files natively. The handle keeps the file alive until
    // helm exits.
    let values_file = match &args.values {
        Some(values) if !values.is_null() => {
            let mut file =
                tempfile::NamedTempFile::new().map_err(|e| ToolError::Tool(format!("values file: {e}")))?;
            let body =
                serde_json::to_vec(values).map_err(|e| ToolError::Internal(format!("values serialization: {e}")))?;
            file.write_all(&body)
                .map_err(|e| ToolError::Tool(format!("values file: {e}")))?;
            cmd.arg("-f").arg(file.path());
            Some(file)
        }
        _ => None,
    };

    let stdout = run(cmd).await?;
    drop(values_file);

    let release: Value =
        serde_json::from_str(&stdout).map_err(|e| ToolError::Tool(format!("unparseable helm output: {e}")))?;
    Ok(json!({
        "release": release.get("name"),
        "namespace": release.get("namespace"),
        "revision": release.get("version"),
        "status": release.pointer("/info/status"),
    }))
}

#[derive(Deserialize)]
struct HelmUninstallArgs {
    #[serde(default)]
    context: String,
    release: String,
    #[serde(default = "super::default_namespace")]
    namespace: String,
}

async fn helm_uninstall(ctx: Arc<ToolContext>, args: HelmUninstallArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    ctx.authorize(&cluster, "delete", "", "secrets", &args.namespace).await?;

    let mut cmd = base_command(ctx.helm(), &args.context);
    cmd.arg("uninstall").arg(&args.release).arg("-n").arg(&args.namespace);

    let stdout = run(cmd).await?;
    Ok(json!({ "uninstalled": args.release, "namespace": args.namespace, "output": stdout.trim() }))
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::path::PathBuf;

    use super::*;

    fn args_of(cmd: &Command) -> Vec<OsString> {
        cmd.as_std().get_args().map(OsString::from).collect()
    }

    #[test]
    fn repository_paths_and_context_are_forwarded() {
        let helm = HelmConfig {
            binary: Some(PathBuf::from("/opt/helm")),
            repository_cache: Some(PathBuf::from("/var/cache/helm")),
            repository_config: Some(PathBuf::from("/etc/helm/repositories.yaml")),
        };

        let cmd = base_command(&helm, "staging");
        assert_eq!(cmd.as_std().get_program(), "/opt/helm");

        let args = args_of(&cmd);
        assert!(args.contains(&OsString::from("--repository-cache")));
        assert!(args.contains(&OsString::from("/var/cache/helm")));
        assert!(args.contains(&OsString::from("--repository-config")));
        assert!(args.contains(&OsString::from("--kube-context")));
        assert!(args.contains(&OsString::from("staging")));
    }

    #[test]
    fn default_command_is_bare_helm() {
        let cmd = base_command(&HelmConfig::default(), "");
        assert_eq!(cmd.as_std().get_program(), "helm");
        assert!(args_of(&cmd).is_empty());
    }

    struct UnreachableProvider;

    #[async_trait::async_trait]
    impl navarch_client::ClientProvider for UnreachableProvider {
        async fn get_bundle(&self, _context: &str) -> Result<std::sync::Arc<navarch_client::ClientBundle>, navarch_client::ClientError> {
            Err(navarch_client::ClientError::Configuration("no cluster in tests".to_string()))
        }

        fn list_contexts(&self) -> Result<Vec<String>, navarch_client::ClientError> {
            Ok(vec![])
        }

        fn default_context(&self) -> String {
            "default".to_string()
        }
    }

    #[tokio::test]
    async fn mutators_resolve_the_cluster_before_shelling_out() {
        let ctx = Arc::new(ToolContext::new(
            Arc::new(UnreachableProvider),
            true,
            5,
            None,
            HelmConfig::default(),
        ));

        let install = helm_install(Arc::clone(&ctx), HelmInstallArgs {
            context: String::new(),
            release: "web".to_string(),
            chart: "bitnami/nginx".to_string(),
            namespace: "default".to_string(),
            values: None,
        })
        .await;
        let Err(err) = install else {
            panic!("install without a reachable cluster must fail");
        };
        assert!(err.to_string().contains("no cluster in tests"));

        let uninstall = helm_uninstall(ctx, HelmUninstallArgs {
            context: String::new(),
            release: "web".to_string(),
            namespace: "default".to_string(),
        })
        .await;
        let Err(err) = uninstall else {
            panic!("uninstall without a reachable cluster must fail");
        };
        assert!(err.to_string().contains("no cluster in tests"));
    }
}
