//! Replays a recorded bridge event log.

use std::path::Path;

use anyhow::{Context, Result};
use lumen_core::bridge::{Workspace, parse_events};
use lumen_core::config::Config;
use lumen_core::effects::Area;
use lumen_core::render::{ContentRenderer, standalone_page};

pub struct ReplayOptions<'a> {
    pub input: Option<&'a Path>,
    pub area: Option<Area>,
    pub effects: bool,
    pub document: bool,
}

pub fn run(options: &ReplayOptions<'_>, config: &Config) -> Result<()> {
    let log = super::read_input(options.input)?;
    let events = parse_events(&log).context("parse event log")?;
    tracing::info!(events = events.len(), "replaying");

    let mut workspace = Workspace::new(ContentRenderer::new(config), config);
    for event in &events {
        let effects = workspace.handle(event);
        if options.effects {
            for effect in effects {
                println!("{}", serde_json::to_string(&effect)?);
            }
        }
    }
    if options.effects {
        return Ok(());
    }

    let html = match options.area {
        Some(area) => workspace.area_html(area),
        None => workspace.to_html(),
    };
    if options.document {
        println!("{}", standalone_page("Lumen replay", &html));
    } else {
        println!("{html}");
    }
    Ok(())
}
