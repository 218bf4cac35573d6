//! Bastion menu: reserved commands and the asset table

use std::sync::Arc;

use jb_core::Asset;
use tabled::{settings::Style, Table, Tabled};

/// Commands the menu handles itself instead of treating as an asset id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
    /// `p`: print the asset table
    ListAssets,
    /// `cls` / `clear`
    ClearScreen,
    /// `q` / `exit`: end the client session
    Quit,
}

impl MenuCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "p" => Some(MenuCommand::ListAssets),
            "cls" | "clear" => Some(MenuCommand::ClearScreen),
            "q" | "exit" => Some(MenuCommand::Quit),
            _ => None,
        }
    }
}

#[derive(Tabled)]
struct AssetRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "ADDRESS")]
    address: String,
    #[tabled(rename = "PLATFORM")]
    platform: String,
    #[tabled(rename = "GROUP")]
    group: String,
    #[tabled(rename = "REMARK")]
    remark: String,
}

/// Render the asset table for a raw-mode terminal (CRLF line endings)
pub fn render_asset_table(assets: &[Arc<Asset>]) -> String {
    if assets.is_empty() {
        return "No assets available\r\n".to_string();
    }

    let rows: Vec<AssetRow> = assets
        .iter()
        .map(|a| AssetRow {
            id: a.id.to_string(),
            name: a.name.clone(),
            address: a.address.clone(),
            platform: a.platform.clone(),
            group: a.group.clone(),
            remark: a.remark.clone(),
        })
        .collect();

    let table = Table::new(rows).with(Style::psql()).to_string();
    let mut out = table.replace('\n', "\r\n");
    out.push_str("\r\n");
    out
}
