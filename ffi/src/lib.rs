/*
 * lib.rs
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

//! C FFI for the HTTP Server Tester core. The desktop form calls `httptester_send_request`;
//! the result text arrives on a callback from a runtime worker thread.
//! All string parameters are UTF-8 NUL-terminated. Strings passed to callbacks are only
//! valid for the duration of the call.

use libc::{c_char, c_int, c_void};
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use httptester_core::config::load_config;
use httptester_core::protocol::http::{
    CredentialPrompt, CredentialReply, CredentialRequest, Credentials, HeaderBlock, Method, OutboundRequest,
};
use httptester_core::{ClientConfig, HttpClient, HttpError, Session, Target};
use log::{debug, warn};
use tokio::sync::oneshot;

/// Wrapper so *mut c_void can be moved into Send futures. C callbacks are invoked from worker threads.
struct SendableUserData(*mut c_void);
unsafe impl Send for SendableUserData {}
unsafe impl Sync for SendableUserData {}

/// Result callback: response text (status and header lines, or an error description),
/// saved file path (NULL if nothing was saved), save error (NULL if none), user_data.
type OnRequestComplete = extern "C" fn(*const c_char, *const c_char, *const c_char, *mut c_void);

/// Headers-ready callback: status and header lines of every leg, delivered before the body is
/// read, so the UI can show the response while a download is still being saved.
type OnHeadersReady = extern "C" fn(*const c_char, *mut c_void);

/// Credential request callback: request_id, dialog title, dialog message, target URL, user_data.
/// UI shows the dialog on its own thread, then calls httptester_credential_provide or
/// httptester_credential_cancel with the same request_id.
type CredentialRequestCallback = extern "C" fn(u64, *const c_char, *const c_char, *const c_char, *mut c_void);

/// Holds the shared tokio runtime, the active config and the credential requests awaiting the UI.
struct Registry {
    runtime: tokio::runtime::Runtime,
    config: RwLock<ClientConfig>,
    credential_callback: Mutex<Option<(CredentialRequestCallback, SendableUserData)>>,
    pending_credentials: Mutex<HashMap<u64, oneshot::Sender<CredentialReply>>>,
    credential_counter: AtomicU64,
}

fn registry() -> Option<&'static Registry> {
    static REGISTRY: once_cell::sync::OnceCell<Registry> = once_cell::sync::OnceCell::new();
    REGISTRY
        .get_or_try_init(|| {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()?;
            Ok::<_, std::io::Error>(Registry {
                runtime,
                config: RwLock::new(ClientConfig::default()),
                credential_callback: Mutex::new(None),
                pending_credentials: Mutex::new(HashMap::new()),
                credential_counter: AtomicU64::new(0),
            })
        })
        .map_err(|e| set_last_error(&format!("failed to create tokio runtime: {}", e)))
        .ok()
}

fn ptr_to_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string()) }
}

/// Interior NULs are replaced so the text always reaches the callback.
fn to_cstring(s: &str) -> CString {
    CString::new(s.replace('\0', " ")).unwrap_or_default()
}

thread_local! {
    static LAST_ERROR: std::cell::RefCell<Option<CString>> = const { std::cell::RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    let msg = to_cstring(msg);
    LAST_ERROR.with(|e| *e.borrow_mut() = Some(msg));
}

fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

/// Credential prompt that parks the sender under a fresh request id and asks the C side.
struct FfiPrompt;

impl CredentialPrompt for FfiPrompt {
    fn request_credentials(&self, request: CredentialRequest) -> oneshot::Receiver<CredentialReply> {
        let (tx, rx) = oneshot::channel();
        let Some(reg) = registry() else {
            return rx;
        };
        let callback = reg
            .credential_callback
            .lock()
            .ok()
            .and_then(|g| g.as_ref().map(|(cb, ud)| (*cb, ud.0 as usize)));
        let Some((cb, user_data)) = callback else {
            debug!("no credential callback registered; cancelling prompt for {}", request.target);
            return rx;
        };
        let id = reg.credential_counter.fetch_add(1, Ordering::Relaxed) + 1;
        if let Ok(mut pending) = reg.pending_credentials.lock() {
            pending.insert(id, tx);
        }
        let title = to_cstring(&request.title);
        let message = to_cstring(&request.message);
        let target = to_cstring(&request.target.to_string());
        cb(id, title.as_ptr(), message.as_ptr(), target.as_ptr(), user_data as *mut c_void);
        rx
    }
}

fn complete_credential_request(request_id: u64, reply: CredentialReply) -> c_int {
    let Some(reg) = registry() else {
        return -1;
    };
    let sender = reg
        .pending_credentials
        .lock()
        .ok()
        .and_then(|mut pending| pending.remove(&request_id));
    match sender {
        Some(tx) => {
            if tx.send(reply).is_err() {
                warn!("credential request {} was abandoned before the reply arrived", request_id);
            }
            clear_last_error();
            0
        }
        None => {
            set_last_error(&format!("no pending credential request {}", request_id));
            -1
        }
    }
}

/// Version string (static, do not free).
#[no_mangle]
pub extern "C" fn httptester_version() -> *const c_char {
    b"0.1.0\0".as_ptr() as *const c_char
}

/// Last error message from a failed call on this thread. Valid until next FFI call. Do not free.
#[no_mangle]
pub extern "C" fn httptester_last_error() -> *const c_char {
    LAST_ERROR.with(|e| e.borrow().as_ref().map(|s| s.as_ptr()).unwrap_or(ptr::null()))
}

/// Free a string returned by this library. No-op if ptr is NULL.
#[no_mangle]
pub unsafe extern "C" fn httptester_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        let _ = CString::from_raw(ptr);
    }
}

/// Load settings from an XML config file. A missing file resets to defaults. Returns 0 or -1.
#[no_mangle]
pub unsafe extern "C" fn httptester_load_config(path: *const c_char) -> c_int {
    let Some(path) = ptr_to_str(path) else {
        set_last_error("path is null or not valid UTF-8");
        return -1;
    };
    let Some(reg) = registry() else {
        return -1;
    };
    match load_config(Path::new(&path)) {
        Ok(config) => {
            if let Ok(mut current) = reg.config.write() {
                *current = config;
            }
            clear_last_error();
            0
        }
        Err(e) => {
            set_last_error(&e);
            -1
        }
    }
}

/// Directory downloaded bodies are written to (created on first save).
/// Returns a newly allocated string (free with httptester_free_string), or NULL.
#[no_mangle]
pub extern "C" fn httptester_downloads_dir() -> *mut c_char {
    let Some(reg) = registry() else {
        return ptr::null_mut();
    };
    match reg.config.read() {
        Ok(config) => to_cstring(&config.downloads_dir.to_string_lossy()).into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Register (or clear, with NULL) the callback used when a server asks for Basic credentials.
/// With no callback registered every challenge is treated as cancelled.
#[no_mangle]
pub extern "C" fn httptester_set_credential_callback(
    callback: Option<CredentialRequestCallback>,
    user_data: *mut c_void,
) {
    let Some(reg) = registry() else {
        return;
    };
    if let Ok(mut slot) = reg.credential_callback.lock() {
        *slot = callback.map(|cb| (cb, SendableUserData(user_data)));
    }
}

/// Answer a credential request. Returns 0, or -1 if request_id is unknown or already answered.
#[no_mangle]
pub unsafe extern "C" fn httptester_credential_provide(
    request_id: u64,
    username: *const c_char,
    password: *const c_char,
) -> c_int {
    let (Some(username), Some(password)) = (ptr_to_str(username), ptr_to_str(password)) else {
        set_last_error("username or password is null or not valid UTF-8");
        let _ = complete_credential_request(request_id, CredentialReply::Cancelled);
        return -1;
    };
    complete_credential_request(
        request_id,
        CredentialReply::Provided(Credentials { username, password }),
    )
}

/// Cancel a credential request; the request is abandoned. Returns 0 or -1.
#[no_mangle]
pub extern "C" fn httptester_credential_cancel(request_id: u64) -> c_int {
    complete_credential_request(request_id, CredentialReply::Cancelled)
}

/// Send one request built from the form fields. Returns immediately. `on_headers` (optional)
/// runs on a worker thread as soon as the final response head is read; `on_complete` runs
/// once every redirect, tunnel and auth leg is done and any body has been saved.
///
/// method, version, host, request_uri and headers are strings (version defaults to HTTP/1.1,
/// blank request_uri to "/"); headers is the raw newline-delimited block. https, save_body and
/// accept_gzip are booleans (non-zero = true). Returns 0 if the request was dispatched, -1 otherwise.
#[no_mangle]
pub unsafe extern "C" fn httptester_send_request(
    method: *const c_char,
    version: *const c_char,
    host: *const c_char,
    port: c_int,
    https: c_int,
    request_uri: *const c_char,
    headers: *const c_char,
    save_body: c_int,
    accept_gzip: c_int,
    on_headers: Option<OnHeadersReady>,
    on_complete: OnRequestComplete,
    user_data: *mut c_void,
) -> c_int {
    let Some(method) = ptr_to_str(method) else {
        set_last_error("method is null or not valid UTF-8");
        return -1;
    };
    let Some(host) = ptr_to_str(host) else {
        set_last_error("host is null or not valid UTF-8");
        return -1;
    };
    let version = ptr_to_str(version)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "HTTP/1.1".to_string());
    let request_uri = ptr_to_str(request_uri).unwrap_or_default();
    let headers = ptr_to_str(headers).unwrap_or_default();
    let Some(reg) = registry() else {
        return -1;
    };
    let config = match reg.config.read() {
        Ok(c) => c.clone(),
        Err(_) => ClientConfig::default(),
    };

    let request = u16::try_from(port).ok().map(|port| {
        OutboundRequest::new(
            Method::parse(method.trim()),
            Target::new(host.as_str(), port, https != 0, request_uri.as_str()),
            request_uri.as_str(),
        )
        .version(version.trim())
        .headers(HeaderBlock::new(headers))
        .save_body(save_body != 0)
        .accept_gzip(accept_gzip != 0)
    });
    let user_data = SendableUserData(user_data);
    clear_last_error();
    reg.runtime.spawn(async move {
        let user_data = user_data;
        let user_data_addr = user_data.0 as usize;
        let client = HttpClient::new(Session::new(config, Arc::new(FfiPrompt)));
        let (text, saved, save_error) = match request {
            None => (HttpError::resolve(host, None).diagnostic(), None, None),
            Some(request) => match client
                .execute_observed(request, |text: &str| {
                    if let Some(cb) = on_headers {
                        let text = to_cstring(text);
                        cb(text.as_ptr(), user_data_addr as *mut c_void);
                    }
                })
                .await
            {
                Ok(exchange) => (
                    exchange.transcript(),
                    exchange.saved_to.map(|p| to_cstring(&p.to_string_lossy())),
                    exchange.save_error.map(|e| to_cstring(&e.diagnostic())),
                ),
                Err(e) => (e.diagnostic(), None, None),
            },
        };
        let text = to_cstring(&text);
        on_complete(
            text.as_ptr(),
            saved.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            save_error.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            user_data.0,
        );
    });
    0
}
