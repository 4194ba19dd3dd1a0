//! One-shot rendering of a complete response.

use std::path::Path;

use anyhow::{Context, Result};
use lumen_core::affordance::{BrowserPreview, SystemClipboard, copy_code_block, preview_code_block};
use lumen_core::config::Config;
use lumen_core::render::{ContentRenderer, standalone_page};

pub struct RenderOptions<'a> {
    pub input: Option<&'a Path>,
    pub document: bool,
    pub title: &'a str,
    pub copy: Option<usize>,
    pub preview: Option<usize>,
}

pub fn run(options: &RenderOptions<'_>, config: &Config) -> Result<()> {
    let raw = super::read_input(options.input)?;
    let renderer = ContentRenderer::new(config);
    let message = renderer.render(&raw);

    if let Some(index) = options.copy {
        copy_code_block(&message, index, &mut SystemClipboard)
            .with_context(|| format!("copy code block {index}"))?;
        eprintln!("Copied code block {index}");
    }
    if let Some(index) = options.preview {
        preview_code_block(&message, index, &mut BrowserPreview::default())
            .with_context(|| format!("preview code block {index}"))?;
    }

    let html = message.to_html();
    if options.document {
        println!("{}", standalone_page(options.title, &html));
    } else {
        println!("{html}");
    }
    Ok(())
}
