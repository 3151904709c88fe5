use cow_utils::CowUtils;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::deferred::DeferredContentProvider;
use crate::error::{ResumeError, StreamingError};
use crate::tree::ComponentTree;

use super::boundary_manager::SuspenseBoundaryManager;
use super::markup::{RESUME_RUNTIME_SCRIPT, escape_html};
use super::renderer::StreamingSerializer;
use super::types::{ReadyState, RenderOptions, SerializeOptions};
use super::validation::validate_document;

pub const DIAGNOSTIC_SCRIPT_ID: &str = "__RESUMABLE_DIAGNOSTIC__";

/// Renders `tree` to completion and wraps the streamed body in a full HTML
/// document.
pub async fn serialize(
    tree: &ComponentTree,
    options: &SerializeOptions,
    provider: Arc<dyn DeferredContentProvider>,
) -> Result<String, ResumeError> {
    serialize_with(tree, options, RenderOptions::default(), provider).await
}

pub async fn serialize_with(
    tree: &ComponentTree,
    options: &SerializeOptions,
    render_options: RenderOptions,
    provider: Arc<dyn DeferredContentProvider>,
) -> Result<String, ResumeError> {
    let serializer = StreamingSerializer::new(provider, render_options);
    let boundaries = serializer.boundary_manager();

    let handle = serializer.render(tree)?;
    let body = handle.stream.collect_text().await?;

    if handle.signals.state() != ReadyState::AllReady && !handle.signals.all_ready().await {
        return Err(StreamingError::Incomplete.into());
    }

    validate_document(&body).map_err(ResumeError::serialization)?;

    let inconsistent = boundaries.validate_no_duplicate_placeholders();
    if !inconsistent.is_empty() {
        warn!("Placeholder bookkeeping inconsistent for {:?}", inconsistent);
    }

    let diagnostic = if options.include_diagnostic_marker {
        diagnostic_script(&boundaries)?
    } else {
        String::new()
    };

    debug!("Serialized document body of {} bytes", body.len());

    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{}</title>
    {}
</head>
<body>
<div id="root">{}</div>
{}</body>
</html>"#,
        escape_html(&options.title),
        RESUME_RUNTIME_SCRIPT,
        body,
        diagnostic
    ))
}

fn diagnostic_script(boundaries: &SuspenseBoundaryManager) -> Result<String, ResumeError> {
    let payload = serde_json::json!({
        "counts": boundaries.counts(),
        "errored": boundaries.errored_boundaries(),
        "placeholders": boundaries.rendered_placeholder_count(),
    });

    let escaped = serde_json::to_string(&payload)?
        .cow_replace("</script>", "<\\/script>")
        .into_owned();

    Ok(format!(
        r#"<script id="{DIAGNOSTIC_SCRIPT_ID}" type="application/json">{escaped}</script>
"#
    ))
}
