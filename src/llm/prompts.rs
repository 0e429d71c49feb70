//! Extraction prompts.

use crate::chunker::PageRange;

/// Prompt for whole-document extraction by file reference.
pub const DOCUMENT_PROMPT: &str = "Extract the complete text of this document, \
processing every page from the first to the last.

Requirements:
- Extract all content verbatim: headings, body text, tables, notes and footnotes.
- Convert tables to Markdown.
- Briefly describe diagrams and images in brackets.
- Do not summarize, skip pages, or stop at a table of contents.
- Perform OCR on scanned pages.
- Preserve reading order; process multi-column layouts column by column.

Output only the extracted text, using Markdown headings (##) for sections.";

/// Prompt for one inlined page-range section.
pub fn section_prompt(pages: PageRange, total_pages: u32, language_hints: &[String]) -> String {
    let mut prompt = format!(
        "This is a section of a larger document: pages {} of {}. \
         Extract all text from these pages verbatim, preserving tables as Markdown. \
         Do not summarize or add commentary.",
        pages.label(),
        total_pages
    );
    append_language_hints(&mut prompt, language_hints);
    prompt
}

/// Whole-document prompt with optional language hints.
pub fn document_prompt(language_hints: &[String]) -> String {
    let mut prompt = DOCUMENT_PROMPT.to_string();
    append_language_hints(&mut prompt, language_hints);
    prompt
}

fn append_language_hints(prompt: &mut String, language_hints: &[String]) {
    if !language_hints.is_empty() {
        prompt.push_str(&format!(
            "\n\nThe document is expected to be in: {}. Keep the original language.",
            language_hints.join(", ")
        ));
    }
}
