/*
 * mod.rs
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

//! Saving downloaded bodies under the downloads directory.
//!
//! Names come from `filename::derive_file_name`, pass through the string-level
//! filesystem-safe transform, and never overwrite: a taken name becomes `base_0.ext`,
//! `base_1.ext`, and so on.

pub mod filename;

use std::io;
use std::path::{Path, PathBuf};

use log::info;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::HttpError;

pub use filename::{derive_file_name, make_path_filesystem_safe, make_string_filesystem_safe, NameHints};

fn candidate(dir: &Path, file_name: &str, attempt: Option<usize>) -> PathBuf {
    match attempt {
        None => dir.join(make_string_filesystem_safe(file_name)),
        Some(i) => {
            let base = make_string_filesystem_safe(filename::base_name_of(file_name));
            let ext = filename::extension_of(file_name);
            dir.join(format!("{}_{}.{}", base, i, ext))
        }
    }
}

/// Write `data` to a new file in `dir` named after `file_name`. Returns the path written.
pub async fn save_download(dir: &Path, file_name: &str, data: &[u8]) -> Result<PathBuf, HttpError> {
    fs::create_dir_all(dir).await.map_err(|source| HttpError::Save {
        file: dir.to_path_buf(),
        source,
    })?;
    let mut attempt = None;
    loop {
        let path = candidate(dir, file_name, attempt);
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(mut file) => {
                let written = async {
                    file.write_all(data).await?;
                    file.flush().await
                }
                .await;
                return match written {
                    Ok(()) => {
                        info!("saved {} bytes to {}", data.len(), path.display());
                        Ok(path)
                    }
                    Err(source) => Err(HttpError::Save { file: path, source }),
                };
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                attempt = Some(attempt.map_or(0, |i| i + 1));
            }
            Err(source) => return Err(HttpError::Save { file: path, source }),
        }
    }
}
