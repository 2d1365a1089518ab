use roxmltree::Node;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::trace;

use crate::error::{nml2_error, Result};
use crate::quantity::Quantity;

/// Tags that define an ion channel at the NML2 document level.
pub const CHANNEL_TAGS: [&str; 2] = ["ionChannel", "ionChannelHH"];

/// Gate flavours of the NML2 schema. All expose the same activation
/// variable `q`, which is what the voltage step protocol records.
pub const GATE_TAGS: [&str; 6] = [
    "gate",
    "gateHHrates",
    "gateHHratesTau",
    "gateHHtauInf",
    "gateHHratesInf",
    "gateHHratesTauInf",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Gate {
    pub id: String,
    pub instances: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: String,
    pub file: String,
    pub gates: Vec<Gate>,
    pub conductance: Option<Quantity>,
    pub species: Option<String>,
    pub notes: Option<String>,
}

impl Channel {
    pub fn gate_ids(&self) -> Vec<String> {
        self.gates.iter().map(|g| g.id.clone()).collect()
    }
}

/// Walk the given NML2 files plus everything they `<include>`, handing every
/// node to `f`. Includes resolve relative to the including file and are read
/// once, however often they are referenced.
pub fn process_files<F>(nmls: &[String], mut f: F) -> Result<()>
where
    F: FnMut(&str, &Node) -> Result<()>,
{
    let mut todo = Vec::new();
    for nml in nmls {
        todo.push(PathBuf::from(&nml).canonicalize()?);
    }
    todo.reverse();
    let mut seen = HashSet::new();
    while let Some(nml) = todo.pop() {
        if seen.contains(&nml) {
            continue;
        }
        trace!("Reading NML2 file {:?}", nml);
        seen.insert(nml.clone());
        let xml = std::fs::read_to_string(&nml)?;
        let tree = roxmltree::Document::parse(&xml)?;
        if tree.root_element().tag_name().name() != "neuroml" {
            return Err(nml2_error(format!("Not a NeuroML2 file {:?}", nml)));
        }
        for node in tree.descendants() {
            f(nml.to_str().unwrap(), &node)?;
            if node.tag_name().name() == "include" {
                if let Some(fd) = node.attribute("href") {
                    let mut nml = nml.parent().unwrap().to_path_buf();
                    nml.push(fd);
                    nml = nml.canonicalize()?;
                    todo.push(nml);
                }
            }
        }
    }
    Ok(())
}

/// All ion channels found in the given files, includes followed. A channel
/// may come back with no gates; the caller decides whether that is fatal.
pub fn read_channels(nmls: &[String]) -> Result<Vec<Channel>> {
    let mut channels = Vec::new();
    process_files(nmls, |file, node| {
        if CHANNEL_TAGS.contains(&node.tag_name().name()) {
            channels.push(channel_of(node, file)?);
        }
        Ok(())
    })?;
    Ok(channels)
}

fn channel_of(node: &Node, file: &str) -> Result<Channel> {
    let id = node
        .attribute("id")
        .ok_or_else(|| nml2_error(format!("Channel without id in {}", file)))?
        .to_string();
    let mut gates = Vec::new();
    for child in node.children() {
        if !GATE_TAGS.contains(&child.tag_name().name()) {
            continue;
        }
        let gid = child
            .attribute("id")
            .ok_or_else(|| nml2_error(format!("Gate without id in channel '{}'", id)))?
            .to_string();
        let instances = match child.attribute("instances") {
            Some(i) => i.parse::<i64>().map_err(|_| {
                nml2_error(format!(
                    "Invalid instances '{}' on gate '{}' of channel '{}'",
                    i, gid, id
                ))
            })?,
            None => 1,
        };
        gates.push(Gate {
            id: gid,
            instances,
        });
    }
    let conductance = match node.attribute("conductance") {
        Some(g) => Some(Quantity::parse(g)?),
        None => None,
    };
    let species = node.attribute("species").map(|s| s.to_string());
    let notes = node
        .children()
        .find(|c| c.tag_name().name() == "notes")
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string());
    Ok(Channel {
        id,
        file: file.to_string(),
        gates,
        conductance,
        species,
        notes,
    })
}
