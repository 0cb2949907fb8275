//! FRS 页面 - 业务能力层
//!
//! 通过 JsExecutor 在真实浏览器标签页中实现 PageReader / PageActions

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::infrastructure::JsExecutor;
use crate::models::{Category, ClassOption, ExtendedItem};
use crate::services::option_text;
use crate::services::page::{CaptchaImage, PageActions, PageReader};

/// 提交时使用的动作码
const CLAIM_ACTION: &str = "ambil";
/// 页面没有验证码图片元素时的默认地址
const DEFAULT_CAPTCHA_PATH: &str = "/securimage/securimage_show.php";
const OVERLAY_ID: &str = "frs-ext-notify-overlay";
/// 外系课程在 FilterBox 中的行标签
const OTHER_DEPT_LABEL: &str = "Kelas Dep. Lain";

/// 页面脚本返回的一条原始选项
#[derive(Debug, Deserialize)]
struct RawOptionRow {
    category: String,
    value: String,
    text: String,
}

/// FRS 页面
pub struct FrsPage {
    executor: JsExecutor,
}

impl FrsPage {
    pub fn new(executor: JsExecutor) -> Self {
        Self { executor }
    }

    fn selectors_json() -> String {
        let map: serde_json::Map<String, serde_json::Value> = Category::ALL
            .iter()
            .map(|c| (c.key().to_string(), json!(c.selector())))
            .collect();
        serde_json::Value::Object(map).to_string()
    }
}

impl PageReader for FrsPage {
    async fn parse_options(&self) -> Result<Vec<ClassOption>> {
        let js_code = format!(
            r##"
            (() => {{
                const groups = {selectors};
                const optionText = (opt) =>
                    (opt.getAttribute && opt.getAttribute("label")) ||
                    opt.text || opt.textContent || opt.innerText || "";
                const out = [];
                const collect = (category, el) => {{
                    for (const opt of el.querySelectorAll("option")) {{
                        const value = opt.value || "";
                        if (!value) continue;
                        out.push({{ category, value, text: optionText(opt) }});
                    }}
                }};
                for (const [category, sel] of Object.entries(groups)) {{
                    for (const el of document.querySelectorAll(sel)) collect(category, el);
                }}
                if (!out.some((r) => r.category === "jurlain")) {{
                    const label = {label}.toLowerCase();
                    for (const tr of document.querySelectorAll("table.FilterBox tr")) {{
                        const tds = tr.querySelectorAll("td");
                        if (!tds.length) continue;
                        const text = (tds[0].textContent || "").trim().toLowerCase();
                        if (!text.includes(label)) continue;
                        const sel = tr.querySelector("select");
                        if (sel) {{ collect("jurlain", sel); break; }}
                    }}
                }}
                return out;
            }})()
            "##,
            selectors = Self::selectors_json(),
            label = json!(OTHER_DEPT_LABEL),
        );

        let rows: Vec<RawOptionRow> = self.executor.eval_as(js_code).await?;
        let options: Vec<ClassOption> = rows
            .iter()
            .filter_map(|row| match Category::from_key(&row.category) {
                Some(category) => Some(option_text::build_option(category, &row.value, &row.text)),
                None => {
                    warn!("未知的班级类别: {}", row.category);
                    None
                }
            })
            .collect();

        debug!("解析到 {} 个班级选项", options.len());
        Ok(options)
    }

    async fn is_acquired(&self, code: &str, section: &str) -> Result<bool> {
        if code.is_empty() {
            return Ok(false);
        }
        let js_code = format!(
            r##"
            (() => {{
                const code = {code};
                const section = {section};
                for (const tr of document.querySelectorAll(".GridStyle tr")) {{
                    const tds = tr.querySelectorAll("td");
                    if (tds.length < 4) continue;
                    const c = (tds[0].textContent || "").trim();
                    const k = (tds[3].textContent || "").trim();
                    if (c === code && k === section) return true;
                }}
                return false;
            }})()
            "##,
            code = json!(code),
            section = json!(section),
        );
        self.executor.eval_as(js_code).await
    }
}

impl PageActions for FrsPage {
    async fn ensure_form(&self) -> Result<()> {
        let missing: Vec<String> = self
            .executor
            .eval_as(
                r##"
                (() => ["#sipform", "#act", "#key", "#captcha_key"]
                    .filter((sel) => !document.querySelector(sel)))()
                "##,
            )
            .await?;

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::missing(missing.join(", ")))
        }
    }

    async fn prepare_claim(&self, raw_value: &str) -> Result<()> {
        let js_code = format!(
            r##"
            (() => {{
                document.querySelector("#act").value = {action};
                document.querySelector("#key").value = {key};
                document.querySelector("#captcha_key").value = "";
                const input = document.querySelector("#captcha_code");
                if (input) {{ input.value = ""; input.focus(); }}
                return true;
            }})()
            "##,
            action = json!(CLAIM_ACTION),
            key = json!(raw_value),
        );
        self.executor.eval(js_code).await?;
        Ok(())
    }

    async fn capture_captcha(&self) -> Result<CaptchaImage> {
        let js_code = format!(
            r##"
            (async () => {{
                const img = document.querySelector("#captcha_image");
                const src = img ? img.getAttribute("src") : {default_path};
                const abs = new URL(src, location.href).href;
                const draw = (el) => {{
                    const w = el.naturalWidth || el.width;
                    const h = el.naturalHeight || el.height;
                    if (!w || !h) return "";
                    const canvas = document.createElement("canvas");
                    canvas.width = w;
                    canvas.height = h;
                    canvas.getContext("2d").drawImage(el, 0, 0, w, h);
                    return canvas.toDataURL("image/png");
                }};
                const load = (el, url) => new Promise((resolve) => {{
                    el.onload = () => resolve(true);
                    el.onerror = () => resolve(false);
                    el.src = url;
                }});
                try {{
                    if (img && img.complete && img.naturalWidth > 0 && img.naturalHeight > 0) {{
                        const dataUrl = draw(img);
                        if (dataUrl) return {{ imageUrl: abs, dataUrl, via: "in-place" }};
                    }}
                    const tmp = new Image();
                    if (await load(tmp, abs)) {{
                        const dataUrl = draw(tmp);
                        if (dataUrl) return {{ imageUrl: abs, dataUrl, via: "load" }};
                    }}
                    const res = await fetch(abs, {{ credentials: "include", cache: "no-store" }});
                    const blob = await res.blob();
                    const dataUrl = await new Promise((resolve, reject) => {{
                        const fr = new FileReader();
                        fr.onload = () => resolve(String(fr.result || ""));
                        fr.onerror = reject;
                        fr.readAsDataURL(blob);
                    }});
                    return {{ imageUrl: abs, dataUrl, via: "fetch" }};
                }} catch (err) {{
                    return {{ imageUrl: abs, dataUrl: "", via: "failed" }};
                }}
            }})()
            "##,
            default_path = json!(DEFAULT_CAPTCHA_PATH),
        );
        self.executor.eval_as(js_code).await
    }

    async fn refresh_captcha(&self) -> Result<Option<CaptchaImage>> {
        self.executor
            .eval_as(
                r##"
                (async () => {
                    const img = document.querySelector("#captcha_image");
                    if (!img) return null;
                    const url = new URL(img.getAttribute("src"), location.href);
                    url.searchParams.set("_", String(Math.random()).slice(2));
                    const loaded = await new Promise((resolve) => {
                        img.onload = () => resolve(true);
                        img.onerror = () => resolve(false);
                        img.src = url.href;
                    });
                    if (!loaded) return null;
                    const w = img.naturalWidth || img.width;
                    const h = img.naturalHeight || img.height;
                    let dataUrl = "";
                    if (w && h) {
                        const canvas = document.createElement("canvas");
                        canvas.width = w;
                        canvas.height = h;
                        canvas.getContext("2d").drawImage(img, 0, 0, w, h);
                        dataUrl = canvas.toDataURL("image/png");
                    }
                    return { imageUrl: url.href, dataUrl, via: "load" };
                })()
                "##,
            )
            .await
    }

    async fn submit_captcha(&self, value: &str) -> Result<()> {
        self.ensure_form().await?;
        let js_code = format!(
            r##"
            (() => {{
                const value = {value};
                const input = document.querySelector("#captcha_code");
                if (input) input.value = value;
                document.querySelector("#captcha_key").value = value;
                const form = document.querySelector("#sipform");
                setTimeout(() => form.submit(), 0);
                return true;
            }})()
            "##,
            value = json!(value),
        );
        self.executor.eval_and_wait_load(js_code).await
    }

    async fn reload(&self) -> Result<()> {
        self.executor.reload().await
    }

    async fn show_increase_overlay(&self, items: &[ExtendedItem]) -> Result<()> {
        let js_code = format!(
            r##"
            (() => {{
                const items = {items};
                document.getElementById({id})?.remove();
                const overlay = document.createElement("div");
                overlay.id = {id};
                overlay.style.cssText =
                    "position:fixed;inset:0;background:rgba(255,0,0,0.25);z-index:2147483647;display:grid;place-items:center";
                const card = document.createElement("div");
                card.style.cssText =
                    "background:#fff;border-radius:12px;max-width:720px;width:90%;padding:16px 18px;font-family:system-ui,Arial,sans-serif";
                const title = document.createElement("div");
                title.textContent = "Kapasitas Kelas Bertambah";
                title.style.cssText = "font-weight:700;font-size:20px;margin-bottom:10px";
                card.appendChild(title);
                for (const it of items) {{
                    const row = document.createElement("div");
                    row.style.cssText = "padding:8px 10px;border:1px solid #eee;border-radius:8px;margin-bottom:8px";
                    row.textContent =
                        `${{it.display_code}} - ${{it.name}} / Kelas ${{it.section}} / Kuota ${{it.old_quota}} -> ${{it.new_quota}} (+${{it.delta}})`;
                    card.appendChild(row);
                }}
                overlay.appendChild(card);
                document.body.appendChild(overlay);
                setTimeout(() => document.getElementById({id})?.remove(), 10000);
                return true;
            }})()
            "##,
            items = serde_json::to_string(items)?,
            id = json!(OVERLAY_ID),
        );
        self.executor.eval(js_code).await?;
        Ok(())
    }

    async fn remove_overlay(&self) -> Result<()> {
        let js_code = format!(
            "(() => {{ document.getElementById({})?.remove(); return true; }})()",
            json!(OVERLAY_ID)
        );
        self.executor.eval(js_code).await?;
        Ok(())
    }

    async fn alert(&self, message: &str) -> Result<()> {
        // alert 会阻塞页面脚本，放到下一轮事件循环
        let js_code = format!(
            "(() => {{ setTimeout(() => alert({}), 0); return true; }})()",
            json!(message)
        );
        self.executor.eval(js_code).await?;
        Ok(())
    }

    fn context_id(&self) -> String {
        self.executor.context_id()
    }
}
