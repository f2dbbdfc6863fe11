/*
 * config.rs
 * Copyright (C) 2023 Brian Reid (br45entei@gmail.com)
 *
 * This file is part of HTTP Server Tester, a manual HTTP/1.1 client.
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! Engine settings: User-Agent, hop limit and the downloads directory.
//! Defaults need no file. An optional XML file overrides them:
//! `<config><user-agent>..</user-agent><max-hops>..</max-hops><downloads-dir>..</downloads-dir></config>`.
//! All XML reading uses the quick_xml parser.

use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::reader::Reader;

/// User-Agent sent when the caller's header block has none.
pub const DEFAULT_USER_AGENT: &str = "HTTPServerTester/1.0 (Windows NT 6.1; Win64; x64)";

/// Upper bound on legs per top-level request (redirect hops plus tunnel upgrade).
pub const DEFAULT_MAX_HOPS: usize = 20;

/// Relative directory downloaded bodies are written to.
pub const DEFAULT_DOWNLOADS_DIR: &str = "downloads";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub user_agent: String,
    pub max_hops: usize,
    pub downloads_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_hops: DEFAULT_MAX_HOPS,
            downloads_dir: PathBuf::from(DEFAULT_DOWNLOADS_DIR),
        }
    }
}

/// Load config from `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<ClientConfig, String> {
    if !path.exists() {
        return Ok(ClientConfig::default());
    }
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    parse_config_xml(&content)
}

/// Parse the XML config. Unknown elements are ignored; blank or invalid values keep the default.
pub fn parse_config_xml(content: &str) -> Result<ClientConfig, String> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut config = ClientConfig::default();
    let mut element_name = Vec::<u8>::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => return Err(format!("XML parse error: {}", e)),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let name = e.name();
                let name = name.as_ref();
                if name == b"user-agent" || name == b"max-hops" || name == b"downloads-dir" {
                    element_name.clear();
                    element_name.extend_from_slice(name);
                }
            }
            Ok(Event::Text(e)) => {
                if element_name.is_empty() {
                    continue;
                }
                let text = e.unescape().map_err(|e| e.to_string())?.trim().to_string();
                if !text.is_empty() {
                    if element_name == b"user-agent" {
                        config.user_agent = text;
                    } else if element_name == b"max-hops" {
                        match text.parse::<usize>() {
                            Ok(n) => config.max_hops = n,
                            Err(_) => log::warn!("ignoring invalid max-hops {:?}", text),
                        }
                    } else if element_name == b"downloads-dir" {
                        config.downloads_dir = PathBuf::from(text);
                    }
                }
                element_name.clear();
            }
            Ok(Event::End(_)) => element_name.clear(),
            _ => {}
        }
        buf.clear();
    }
    Ok(config)
}
