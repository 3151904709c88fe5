//! Markup emitted by the streaming serializer.
//!
//! A boundary resolved during the shell pass is written inline:
//! `<!--$:ID-->CONTENT<!--/$-->`. A pending boundary writes its fallback
//! behind a template anchor, `<!--$?:ID--><template id="B:N"></template>FALLBACK<!--/$-->`,
//! and is later completed by a hidden segment plus `$RC("B:N","S:N")`, or
//! abandoned with `$RX("B:N","MESSAGE")`.

use cow_utils::CowUtils;

pub const RESUME_RUNTIME_SCRIPT: &str = r#"<script>
function $RC(b,s){var t=document.getElementById(b),c=document.getElementById(s);if(!t||!c)return;var e=t.previousSibling;for(var n=t.nextSibling;n&&!(n.nodeType===8&&n.data==="/$");){var x=n.nextSibling;n.parentNode.removeChild(n);n=x}while(c.firstChild)t.parentNode.insertBefore(c.firstChild,t);t.parentNode.removeChild(t);c.parentNode.removeChild(c);if(e&&e.nodeType===8)e.data=e.data.replace("$?","$")}
function $RX(b,m){var t=document.getElementById(b);if(!t)return;t.setAttribute("data-msg",m);var e=t.previousSibling;if(e&&e.nodeType===8)e.data=e.data.replace("$?","$!")}
</script>"#;

pub fn escape_html(text: &str) -> String {
    text.cow_replace('&', "&amp;")
        .cow_replace('<', "&lt;")
        .cow_replace('>', "&gt;")
        .cow_replace('"', "&quot;")
        .cow_replace('\'', "&#39;")
        .into_owned()
}

pub fn escape_attribute(text: &str) -> String {
    text.cow_replace('&', "&amp;")
        .cow_replace('"', "&quot;")
        .cow_replace('<', "&lt;")
        .cow_replace('>', "&gt;")
        .into_owned()
}

pub fn escape_js_string(text: &str) -> String {
    text.cow_replace('\\', "\\\\")
        .cow_replace('"', "\\\"")
        .cow_replace('\'', "\\'")
        .cow_replace('\n', "\\n")
        .cow_replace('\r', "\\r")
        .cow_replace('\t', "\\t")
        .cow_replace('<', "\\u003c")
        .into_owned()
}

pub fn element(tag: &str, attrs: &[(String, String)], inner: &str) -> String {
    let mut html = format!("<{tag}");
    for (name, value) in attrs {
        html.push_str(&format!(r#" {}="{}""#, name, escape_attribute(value)));
    }
    html.push('>');
    html.push_str(inner);
    html.push_str(&format!("</{tag}>"));
    html
}

pub fn inline_boundary(boundary_id: &str, content: &str) -> String {
    format!("<!--$:{boundary_id}-->{content}<!--/$-->")
}

pub fn pending_boundary(boundary_id: &str, segment: u32, fallback: &str) -> String {
    format!(r#"<!--$?:{boundary_id}--><template id="B:{segment}"></template>{fallback}<!--/$-->"#)
}

pub fn completion_segment(segment: u32, content: &str) -> String {
    format!(
        r#"<div hidden id="S:{segment}">{content}</div><script>$RC("B:{segment}","S:{segment}")</script>"#
    )
}

pub fn error_segment(segment: u32, message: &str) -> String {
    format!(r#"<script>$RX("B:{segment}","{}")</script>"#, escape_js_string(message))
}
