//! Summarization request construction.

use crate::findings::Finding;

/// Findings text used when every audit passed.
pub const NO_ISSUES_STATEMENT: &str =
    "No major performance issues found. All audits passed with a score >= 0.9.";

const OUTPUT_CONTRACT: &str = r#"OUTPUT FORMAT (JSON ONLY):
{
  "overall_assessment": "Short 1-2 sentence summary of the overall performance.",
  "issues": [
    {
      "title": "Issue name (e.g. Reduce unused JavaScript)",
      "explanation": "Brief explanation of what is happening.",
      "impact": "Concrete effect on users (e.g. Slows down initial page load).",
      "suggestion": "Specific technical recommendation on how to fix this issue.",
      "severity": "High" | "Medium" | "Low"
    }
  ]
}

Provide RAW JSON only. Do not wrap in markdown code blocks."#;

/// Build the summarization prompt for `url` from ranked `findings`.
pub fn build_prompt(url: &str, findings: &[Finding]) -> String {
    let findings_text = if findings.is_empty() {
        NO_ISSUES_STATEMENT.to_string()
    } else {
        findings
            .iter()
            .map(Finding::render)
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "You are a web performance analyst.\n\n\
         Context:\n\
         The following Lighthouse audit findings are extracted directly from a performance report for {url}.\n\
         The issues are already filtered and sorted from worst to least severe.\n\n\
         Audit Findings:\n\
         {findings_text}\n\n\
         STRICT RULES:\n\
         1. ONLY use the issues listed above. Do NOT invent or assume any additional problems.\n\
         2. If no major issues are listed, clearly state that performance is strong and no critical bottlenecks were detected.\n\
         3. Prioritize the most severe issues first.\n\
         4. Keep the tone professional and factual.\n\
         5. Do NOT exaggerate business impact.\n\n\
         {OUTPUT_CONTRACT}"
    )
}
