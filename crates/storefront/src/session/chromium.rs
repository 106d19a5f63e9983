//! Chromium backend over the Chrome `DevTools` Protocol.
//!
//! chromiumoxide is async; [`ChromiumSession`] owns a private Tokio runtime
//! and blocks on it so the rest of the crate stays synchronous.
//!
//! Element handles are ids in a registry kept on the top window
//! (`window.__sf`). The registry dies with the document, so handles from a
//! previous page report [`SessionError::StaleElement`]. Frames are entered by
//! walking `contentDocument` from the top document, which limits frame
//! support to same-origin frames.

use std::sync::{Arc, Mutex, PoisonError};

use base64::Engine as _;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams, EventJavascriptDialogClosed,
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use super::{ElementHandle, ElementState, ScriptArg, Session, SessionError, SessionResult};
use crate::config::Config;
use crate::locator::Locator;
use crate::result::StorefrontResult;

/// Registry helpers prepended to every evaluated script.
///
/// A node keeps the id it was first given while it stays registered, so
/// repeated lookups do not grow the registry. Once the registry holds 256
/// nodes, detached ones are dropped before a new id is minted.
const PRELUDE: &str = "\
const __sf = window.__sf || (window.__sf = { epoch: Math.random().toString(36).slice(2), next: 0, nodes: new Map(), ids: new WeakMap() });\
const __sf_sweep = () => { for (const [id, node] of __sf.nodes) { if (!node.isConnected) __sf.nodes.delete(id); } };\
const __sf_put = (el) => {\
  const known = __sf.ids.get(el); if (known !== undefined && __sf.nodes.has(known)) return known;\
  if (__sf.nodes.size >= 256) __sf_sweep();\
  const id = __sf.epoch + ':' + (++__sf.next); __sf.nodes.set(id, el); __sf.ids.set(el, id); return id; };\
const __sf_get = (id) => { const el = __sf.nodes.get(id); if (!el || !el.isConnected) throw new Error('__sf_stale'); return el; };\
const __sf_doc = (ids) => ids.reduce((d, id) => { const f = __sf_get(id); if (!f.contentDocument) throw new Error('__sf_noframe'); return f.contentDocument; }, document);";

/// Center of an element in top-level viewport coordinates, after a hit test
const CLICK_POINT: &str = "\
el.scrollIntoView({ block: 'center', inline: 'center' });\
const r = el.getBoundingClientRect();\
let x = r.left + r.width / 2; let y = r.top + r.height / 2;\
if (hitTest) {\
  const hit = el.ownerDocument.elementFromPoint(x, y);\
  if (hit && hit !== el && !el.contains(hit)) {\
    return { intercepted: hit.outerHTML.slice(0, 120) };\
  }\
}\
let win = el.ownerDocument.defaultView;\
while (win.frameElement) { const f = win.frameElement.getBoundingClientRect(); x += f.left; y += f.top; win = win.parent; }\
return { x, y };";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Point {
    Intercepted { intercepted: String },
    At { x: f64, y: f64 },
}

/// Blocking [`Session`] driving a Chromium page
#[derive(Debug)]
pub struct ChromiumSession {
    runtime: Runtime,
    browser: Option<CdpBrowser>,
    page: CdpPage,
    tasks: Vec<JoinHandle<()>>,
    dialog: Arc<Mutex<Option<String>>>,
    frames: Vec<ElementHandle>,
}

impl ChromiumSession {
    /// Launch Chromium and open a blank page.
    ///
    /// Headless unless the configuration says otherwise; CDP requests time
    /// out after the configured page-load timeout.
    pub fn launch(config: &Config) -> StorefrontResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;

        let mut builder = CdpConfig::builder().request_timeout(config.page_load_timeout());
        if !config.headless() {
            builder = builder.with_head();
        }
        let cdp_config = builder.build().map_err(protocol)?;

        let dialog = Arc::new(Mutex::new(None));
        let (browser, page, tasks) = runtime.block_on(async {
            let (browser, mut handler) = CdpBrowser::launch(cdp_config).await.map_err(protocol)?;
            let mut tasks = vec![tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            })];

            let page = browser.new_page("about:blank").await.map_err(protocol)?;

            let mut opened = page
                .event_listener::<EventJavascriptDialogOpening>()
                .await
                .map_err(protocol)?;
            let slot = Arc::clone(&dialog);
            tasks.push(tokio::spawn(async move {
                while let Some(event) = opened.next().await {
                    tracing::debug!(message = %event.message, "dialog opened");
                    *slot.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some(event.message.clone());
                }
            }));

            let mut closed = page
                .event_listener::<EventJavascriptDialogClosed>()
                .await
                .map_err(protocol)?;
            let slot = Arc::clone(&dialog);
            tasks.push(tokio::spawn(async move {
                while closed.next().await.is_some() {
                    *slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
                }
            }));

            Ok::<_, SessionError>((browser, page, tasks))
        })?;

        tracing::info!(headless = config.headless(), "chromium session started");
        Ok(Self {
            runtime,
            browser: Some(browser),
            page,
            tasks,
            dialog,
            frames: Vec::new(),
        })
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.browser.is_some() {
            Ok(())
        } else {
            Err(SessionError::Closed)
        }
    }

    /// Evaluate `body` as a function body with `doc` bound to the current
    /// document
    fn run(&self, body: &str) -> SessionResult<Value> {
        self.ensure_open()?;
        let frames: Vec<&str> = self.frames.iter().map(ElementHandle::id).collect();
        let frames = serde_json::to_string(&frames).map_err(script)?;
        let expression =
            format!("(() => {{ {PRELUDE} const doc = __sf_doc({frames}); {body} }})()");
        let result = self
            .runtime
            .block_on(self.page.evaluate(expression))
            .map_err(|err| evaluation_error(&err.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    /// Run `body` with `el` bound to the element behind `element`
    fn run_on(&self, element: &ElementHandle, body: &str) -> SessionResult<Value> {
        let id = js_string(element.id());
        self.run(&format!("const el = __sf_get({id}); {body}"))
            .map_err(|err| match err {
                SessionError::StaleElement { .. } => SessionError::StaleElement {
                    id: element.id().to_string(),
                },
                other => other,
            })
    }

    fn point(&self, element: &ElementHandle, hit_test: bool) -> SessionResult<Point> {
        let value = self.run_on(
            element,
            &format!("const hitTest = {hit_test}; {CLICK_POINT}"),
        )?;
        serde_json::from_value(value).map_err(script)
    }

    fn mouse(&self, kind: DispatchMouseEventType, x: f64, y: f64) -> SessionResult<()> {
        let moved = matches!(kind, DispatchMouseEventType::MouseMoved);
        let mut builder = DispatchMouseEventParams::builder().r#type(kind).x(x).y(y);
        if !moved {
            builder = builder.button(MouseButton::Left).click_count(1);
        }
        let params = builder.build().map_err(protocol)?;
        self.runtime
            .block_on(self.page.execute(params))
            .map_err(protocol)?;
        Ok(())
    }

    fn key(&self, params: DispatchKeyEventParams) -> SessionResult<()> {
        self.runtime
            .block_on(self.page.execute(params))
            .map_err(protocol)?;
        Ok(())
    }

    fn focus(&self, element: &ElementHandle) -> SessionResult<()> {
        self.run_on(element, "el.focus(); return true;").map(|_| ())
    }

    fn close_dialog(&mut self, accept: bool) -> SessionResult<()> {
        self.ensure_open()?;
        if self.alert_text()?.is_none() {
            return Err(SessionError::NoAlert);
        }
        self.runtime
            .block_on(self.page.execute(HandleJavaScriptDialogParams::new(accept)))
            .map_err(protocol)?;
        *self.dialog.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

impl Session for ChromiumSession {
    fn navigate(&mut self, url: &str) -> SessionResult<()> {
        self.ensure_open()?;
        tracing::debug!(url, "goto");
        self.runtime
            .block_on(self.page.goto(url))
            .map_err(|err| SessionError::Navigation {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        self.frames.clear();
        Ok(())
    }

    fn current_url(&self) -> SessionResult<String> {
        self.ensure_open()?;
        let url = self.runtime.block_on(self.page.url()).map_err(protocol)?;
        Ok(url.unwrap_or_default())
    }

    fn title(&self) -> SessionResult<String> {
        self.ensure_open()?;
        let title = self
            .runtime
            .block_on(self.page.get_title())
            .map_err(protocol)?;
        Ok(title.unwrap_or_default())
    }

    fn find_all(
        &self,
        scope: Option<&ElementHandle>,
        locator: &Locator,
    ) -> SessionResult<Vec<ElementHandle>> {
        let query = locator.to_query_all("root");
        let body = format!("return {query}.map(__sf_put);");
        let value = match scope {
            Some(scope) => self.run_on(scope, &format!("const root = el; {body}"))?,
            None => self.run(&format!("const root = doc; {body}"))?,
        };
        let ids: Vec<String> = serde_json::from_value(value).map_err(script)?;
        Ok(ids.into_iter().map(ElementHandle::new).collect())
    }

    fn element_state(&self, element: &ElementHandle) -> SessionResult<ElementState> {
        let value = self.run_on(
            element,
            "const s = el.ownerDocument.defaultView.getComputedStyle(el);\
             const r = el.getBoundingClientRect();\
             return { displayed: s.display !== 'none' && s.visibility !== 'hidden' && !el.hidden,\
                      enabled: !el.disabled, width: r.width, height: r.height };",
        )?;
        serde_json::from_value(value).map_err(script)
    }

    fn text(&self, element: &ElementHandle) -> SessionResult<String> {
        let value = self.run_on(
            element,
            "return el.getClientRects().length === 0 ? '' : (el.innerText ?? el.textContent ?? '');",
        )?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn attribute(&self, element: &ElementHandle, name: &str) -> SessionResult<Option<String>> {
        let name = js_string(name);
        let value = self.run_on(
            element,
            &format!(
                "const name = {name};\
                 if (name === 'value' && 'value' in el) return String(el.value);\
                 return el.getAttribute(name);"
            ),
        )?;
        Ok(value.as_str().map(ToString::to_string))
    }

    fn click(&mut self, element: &ElementHandle) -> SessionResult<()> {
        match self.point(element, true)? {
            Point::Intercepted { intercepted } => Err(SessionError::ClickIntercepted {
                message: format!("click would land on {intercepted}"),
            }),
            Point::At { x, y } => {
                self.mouse(DispatchMouseEventType::MouseMoved, x, y)?;
                self.mouse(DispatchMouseEventType::MousePressed, x, y)?;
                self.mouse(DispatchMouseEventType::MouseReleased, x, y)
            }
        }
    }

    fn clear(&mut self, element: &ElementHandle) -> SessionResult<()> {
        self.run_on(
            element,
            "if (!('value' in el) || el.disabled || el.readOnly) throw new Error('__sf_readonly');\
             el.focus(); el.value = '';\
             el.dispatchEvent(new Event('input', { bubbles: true }));\
             return true;",
        )
        .map(|_| ())
    }

    fn send_keys(&mut self, element: &ElementHandle, text: &str) -> SessionResult<()> {
        self.focus(element)?;
        for ch in text.chars() {
            let params = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::Char)
                .text(ch.to_string())
                .build()
                .map_err(protocol)?;
            self.key(params)?;
        }
        Ok(())
    }

    fn press_enter(&mut self, element: &ElementHandle) -> SessionResult<()> {
        self.focus(element)?;
        let down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key("Enter")
            .code("Enter")
            .text("\r")
            .windows_virtual_key_code(13)
            .build()
            .map_err(protocol)?;
        self.key(down)?;
        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key("Enter")
            .code("Enter")
            .windows_virtual_key_code(13)
            .build()
            .map_err(protocol)?;
        self.key(up)
    }

    fn hover(&mut self, element: &ElementHandle) -> SessionResult<()> {
        match self.point(element, false)? {
            Point::At { x, y } => self.mouse(DispatchMouseEventType::MouseMoved, x, y),
            Point::Intercepted { intercepted } => Err(SessionError::NotInteractable {
                message: format!("pointer blocked by {intercepted}"),
            }),
        }
    }

    fn execute_script(&mut self, code: &str, args: &[ScriptArg]) -> SessionResult<Value> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(match arg {
                ScriptArg::Element(element) => format!("__sf_get({})", js_string(element.id())),
                ScriptArg::Value(value) => value.to_string(),
            });
        }
        let body = format!(
            "const args = [{}];\
             const out = (function() {{ {code} }}).apply(doc.defaultView, args);\
             return out instanceof Element ? __sf_put(out) : out;",
            values.join(", ")
        );
        self.run(&body)
    }

    fn screenshot(&self) -> SessionResult<Vec<u8>> {
        self.ensure_open()?;
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let screenshot = self
            .runtime
            .block_on(self.page.execute(params))
            .map_err(protocol)?;
        base64::engine::general_purpose::STANDARD
            .decode(&screenshot.data)
            .map_err(protocol)
    }

    fn alert_text(&self) -> SessionResult<Option<String>> {
        self.ensure_open()?;
        Ok(self
            .dialog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn accept_alert(&mut self) -> SessionResult<()> {
        self.close_dialog(true)
    }

    fn dismiss_alert(&mut self) -> SessionResult<()> {
        self.close_dialog(false)
    }

    fn enter_frame(&mut self, frame: &ElementHandle) -> SessionResult<()> {
        let reachable = self.run_on(frame, "return !!el.contentDocument;")?;
        if reachable != Value::Bool(true) {
            return Err(SessionError::NoSuchFrame {
                message: format!("{} has no reachable document", frame.id()),
            });
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    fn leave_frame(&mut self) -> SessionResult<()> {
        self.ensure_open()?;
        self.frames.pop();
        Ok(())
    }

    fn leave_all_frames(&mut self) -> SessionResult<()> {
        self.ensure_open()?;
        self.frames.clear();
        Ok(())
    }

    fn quit(&mut self) -> SessionResult<()> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };
        let closed = self.runtime.block_on(async {
            browser.close().await.map_err(protocol)?;
            browser.wait().await.map_err(protocol)?;
            Ok::<_, SessionError>(())
        });
        for task in self.tasks.drain(..) {
            task.abort();
        }
        tracing::info!("chromium session closed");
        closed
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Err(err) = self.quit() {
            tracing::warn!(error = %err, "failed to close chromium");
        }
    }
}

fn js_string(value: &str) -> String {
    Value::from(value).to_string()
}

fn protocol(err: impl std::fmt::Display) -> SessionError {
    SessionError::Protocol {
        message: err.to_string(),
    }
}

fn script(err: impl std::fmt::Display) -> SessionError {
    SessionError::Script {
        message: err.to_string(),
    }
}

/// Map the registry's sentinel exceptions back to typed errors
fn evaluation_error(message: &str) -> SessionError {
    if message.contains("__sf_stale") {
        SessionError::StaleElement {
            id: String::new(),
        }
    } else if message.contains("__sf_noframe") {
        SessionError::NoSuchFrame {
            message: "frame document not reachable".to_string(),
        }
    } else if message.contains("__sf_readonly") {
        SessionError::NotInteractable {
            message: "element does not accept text".to_string(),
        }
    } else {
        script(message)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod evaluation_error_tests {
        use super::*;

        #[test]
        fn test_sentinels_map_to_typed_errors() {
            assert!(matches!(
                evaluation_error("Uncaught Error: __sf_stale"),
                SessionError::StaleElement { .. }
            ));
            assert!(matches!(
                evaluation_error("Error: __sf_noframe"),
                SessionError::NoSuchFrame { .. }
            ));
            assert!(matches!(
                evaluation_error("Error: __sf_readonly"),
                SessionError::NotInteractable { .. }
            ));
            assert!(matches!(
                evaluation_error("ReferenceError: foo is not defined"),
                SessionError::Script { .. }
            ));
        }
    }

    mod registry_tests {
        use super::*;

        #[test]
        fn test_known_nodes_reuse_their_id() {
            let put = PRELUDE.split("const __sf_put").nth(1).unwrap();
            let lookup = put.find("__sf.ids.get(el)").unwrap();
            let mint = put.find("++__sf.next").unwrap();
            assert!(lookup < mint);
            assert!(put.contains("__sf.ids.set(el, id)"));
        }

        #[test]
        fn test_detached_nodes_are_swept_before_minting() {
            assert!(PRELUDE.contains("ids: new WeakMap()"));
            assert!(PRELUDE.contains("if (!node.isConnected) __sf.nodes.delete(id)"));
            let put = PRELUDE.split("const __sf_put").nth(1).unwrap();
            assert!(put.find("__sf_sweep()").unwrap() < put.find("++__sf.next").unwrap());
        }
    }

    mod point_tests {
        use super::*;

        #[test]
        fn test_point_shapes() {
            let at: Point = serde_json::from_value(serde_json::json!({ "x": 4.0, "y": 8.5 })).unwrap();
            assert!(matches!(at, Point::At { x, y } if (x - 4.0).abs() < f64::EPSILON && (y - 8.5).abs() < f64::EPSILON));
            let hit: Point =
                serde_json::from_value(serde_json::json!({ "intercepted": "<div class=\"overlay\">" }))
                    .unwrap();
            assert!(matches!(hit, Point::Intercepted { .. }));
        }
    }
}
