//! Result bundle commands

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use xcauto_common::{Error, ToolOutput};
use xcauto_driver::IntoToolOutput;
use xcauto_results::{AttachmentResolver, ResultBundle, TestAttachment, UiElementNode};

use super::action::absolute;
use super::{emit, Context};
use crate::output::{print_list, print_serialized, TableDisplay};

#[derive(Args, Clone)]
pub struct BundleArgs {
    /// Path to an .xcresult bundle
    #[arg(short, long, conflicts_with = "project")]
    pub bundle: Option<PathBuf>,

    /// Use the newest bundle recorded for this project
    #[arg(short, long, env = "XCAUTO_PROJECT")]
    pub project: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum ResultsCommands {
    /// Counts and failing tests
    Summary(BundleArgs),

    /// Test tree with case indices
    Tests(BundleArgs),

    /// One node by index, identifier or name
    Node {
        #[command(flatten)]
        bundle: BundleArgs,
        query: String,
    },

    /// Console output, optionally sliced to one test
    Console {
        #[command(flatten)]
        bundle: BundleArgs,
        query: Option<String>,
    },

    /// Raw activity tree for a test
    Activities {
        #[command(flatten)]
        bundle: BundleArgs,
        query: String,
    },

    /// Attachments recorded by a test
    Attachments {
        #[command(flatten)]
        bundle: BundleArgs,
        query: String,
    },

    /// Export an attachment payload to a temp file
    Export {
        #[command(flatten)]
        bundle: BundleArgs,
        /// Payload id as listed by `attachments`
        payload_id: String,
        /// File name for the exported payload
        #[arg(long, default_value = "attachment")]
        name: String,
    },

    /// Screenshot closest to a moment in a test
    Screenshot {
        #[command(flatten)]
        bundle: BundleArgs,
        query: String,
        /// Seconds since the test started
        #[arg(long)]
        at: f64,
    },

    /// UI hierarchy captured during a test
    Hierarchy {
        #[command(flatten)]
        bundle: BundleArgs,
        query: String,
        /// Seconds since the test started
        #[arg(long)]
        at: Option<f64>,
        /// Show one element by flat index
        #[arg(long, conflicts_with = "identifier")]
        element: Option<usize>,
        /// Show the first element with this accessibility identifier
        #[arg(long)]
        identifier: Option<String>,
        /// Directory for the full and slim JSON snapshots
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

/// Node lookup result
#[derive(Serialize)]
struct NodeView {
    index: Option<usize>,
    name: String,
    identifier: Option<String>,
    status: String,
    duration: Option<f64>,
    path: Vec<String>,
    failures: Vec<String>,
}

impl IntoToolOutput for NodeView {
    fn into_tool_output(self) -> xcauto_common::Result<ToolOutput> {
        let mut text = match self.index {
            Some(index) => format!("[{}] {}", index, self.name),
            None => self.name.clone(),
        };
        text.push_str(&format!("\nStatus: {}", self.status));
        if let Some(identifier) = &self.identifier {
            text.push_str(&format!("\nIdentifier: {}", identifier));
        }
        if let Some(duration) = self.duration {
            text.push_str(&format!("\nDuration: {:.3}s", duration));
        }
        text.push_str(&format!("\nPath: {}", self.path.join(" > ")));
        for failure in &self.failures {
            text.push_str(&format!("\n  - {}", failure));
        }
        Ok(ToolOutput::text(text))
    }
}

/// Element lookup or outline of a parsed hierarchy
#[derive(Serialize)]
struct HierarchyView {
    attachment: String,
    snapshot: PathBuf,
    slim: PathBuf,
    elements: usize,
    element: Option<UiElementNode>,
    outline: String,
}

impl IntoToolOutput for HierarchyView {
    fn into_tool_output(self) -> xcauto_common::Result<ToolOutput> {
        let mut output = ToolOutput::text(format!(
            "'{}': {} elements\nFull: {}\nSlim: {}",
            self.attachment,
            self.elements,
            self.snapshot.display(),
            self.slim.display()
        ));
        match &self.element {
            Some(element) => output.push_text(format!(
                "{} {}\n{}",
                element.element_type,
                element.label.as_deref().unwrap_or(""),
                element.raw.trim()
            )),
            None => output.push_text(self.outline.trim_end().to_string()),
        }
        Ok(output)
    }
}

impl TableDisplay for TestAttachment {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Kind", "Timestamp", "Payload"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            format!("{:?}", self.kind()),
            self.timestamp
                .map(|t| format!("{:.2}s", t))
                .unwrap_or_else(|| "-".to_string()),
            self.payload_id.clone(),
        ]
    }
}

async fn open_bundle(args: &BundleArgs, ctx: &Context) -> Result<ResultBundle> {
    let path = match (&args.bundle, &args.project) {
        (Some(bundle), _) => absolute(bundle)?,
        (None, Some(project)) => ctx
            .orchestrator
            .latest_result_bundle(&absolute(project)?)
            .await?
            .ok_or_else(|| anyhow!("no result bundles recorded for {}", project.display()))?,
        (None, None) => return Err(anyhow!("pass --bundle or --project")),
    };
    Ok(ResultBundle::open(ctx.orchestrator.result_tool(&path)).await?)
}

pub async fn execute(cmd: ResultsCommands, ctx: &Context) -> Result<()> {
    let format = ctx.format;
    match cmd {
        ResultsCommands::Summary(args) => {
            let bundle = open_bundle(&args, ctx).await?;
            emit(bundle.report().await, format)
        }

        ResultsCommands::Tests(args) => {
            let bundle = open_bundle(&args, ctx).await?;
            if format.is_structured() {
                let cases: Vec<_> = bundle.tree().test_cases().map(|(_, node)| node).collect();
                return print_serialized(&cases, format);
            }
            emit(Ok(bundle.tree().render()), format)
        }

        ResultsCommands::Node { bundle: args, query } => {
            let bundle = open_bundle(&args, ctx).await?;
            let view = bundle.find_node(&query).map(|(id, node)| {
                let tree = bundle.tree();
                NodeView {
                    index: tree.case_index_of(id),
                    name: node.name.clone(),
                    identifier: node.node_identifier.clone(),
                    status: format!("{:?}", node.result),
                    duration: node.duration,
                    path: tree.path_of(id).into_iter().map(String::from).collect(),
                    failures: tree.failure_messages(id).into_iter().map(String::from).collect(),
                }
            });
            emit(view, format)
        }

        ResultsCommands::Console { bundle: args, query } => {
            let bundle = open_bundle(&args, ctx).await?;
            emit(bundle.console_output(query.as_deref()).await, format)
        }

        ResultsCommands::Activities { bundle: args, query } => {
            let bundle = open_bundle(&args, ctx).await?;
            match bundle.activities(&query).await {
                Ok(value) if format.is_structured() => print_serialized(&value, format),
                Ok(value) => emit(Ok(serde_json::to_string_pretty(&value)?), format),
                Err(e) => emit::<String>(Err(e), format),
            }
        }

        ResultsCommands::Attachments { bundle: args, query } => {
            let bundle = open_bundle(&args, ctx).await?;
            match bundle.attachments(&query).await {
                Ok(attachments) => print_list(&attachments, format),
                Err(e) => emit::<String>(Err(e), format),
            }
        }

        ResultsCommands::Export {
            bundle: args,
            payload_id,
            name,
        } => {
            let bundle = open_bundle(&args, ctx).await?;
            let exported = bundle
                .export_attachment(&payload_id, &name)
                .await
                .map(|path| path.display().to_string());
            emit(exported, format)
        }

        ResultsCommands::Screenshot {
            bundle: args,
            query,
            at,
        } => {
            let bundle = open_bundle(&args, ctx).await?;
            let resolver = AttachmentResolver::new(&bundle, ctx.orchestrator.frame_extractor())
                .with_policy(ctx.config().screenshots.fallback.clone());
            emit(resolver.screenshot(&query, at).await, format)
        }

        ResultsCommands::Hierarchy {
            bundle: args,
            query,
            at,
            element,
            identifier,
            out,
        } => {
            let bundle = open_bundle(&args, ctx).await?;
            let resolver = AttachmentResolver::new(&bundle, ctx.orchestrator.frame_extractor());
            let view = match resolver.ui_hierarchy(&query, at).await {
                Ok(snapshot) => {
                    let hierarchy = &snapshot.hierarchy;
                    let dir = out.unwrap_or_else(|| std::env::temp_dir().join("xcauto-hierarchy"));
                    let stem = snapshot
                        .path
                        .file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_else(|| "hierarchy".to_string());
                    let (full, slim) = hierarchy.write_snapshot(&dir, &stem)?;
                    let selected = match (element, identifier) {
                        (Some(index), _) => Some(hierarchy.element(index).cloned()),
                        (None, Some(id)) => Some(hierarchy.find_by_identifier(&id).cloned().ok_or_else(
                            || Error::not_found("UI element", id.as_str()),
                        )),
                        (None, None) => None,
                    };
                    match selected.transpose() {
                        Ok(element) => Ok(HierarchyView {
                            attachment: snapshot.attachment.name.clone(),
                            snapshot: full,
                            slim,
                            elements: hierarchy.len(),
                            element,
                            outline: hierarchy.outline(),
                        }),
                        Err(e) => Err(e),
                    }
                }
                Err(e) => Err(e),
            };
            emit(view, format)
        }
    }
}
