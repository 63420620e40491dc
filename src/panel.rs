// Side panel document. A fixed template filled from the session and current stage.
use crate::content::Stage;
use crate::session::{DynamicImageMode, SessionState};

const STYLE: &str = r#"<style>
:root { --bg-primary: #121212; --bg-secondary: #1E1E1E; --bg-tertiary: #2D2D2D;
        --text-primary: #ffffff; --accent-color: #007AFF; --danger-color: #FF453A; }
html, body { margin: 0; padding: 0; background-color: var(--bg-primary); color: var(--text-primary);
             font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; }
.container { padding: 16px; }
.block { background-color: var(--bg-secondary); border-radius: 8px; padding: 16px; margin-bottom: 16px; }
.flex-center, .control-group { display: flex; justify-content: center; align-items: center; gap: 16px; flex-wrap: wrap; }
.stage-title { text-align: center; white-space: nowrap; overflow: hidden; text-overflow: ellipsis; }
button, select { padding: 8px 16px; background-color: var(--bg-tertiary); color: var(--text-primary);
                 border: none; border-radius: 6px; cursor: pointer; }
button:disabled { opacity: 0.5; cursor: not-allowed; }
.close-button { background-color: var(--danger-color); }
.spinner { text-align: center; padding: 32px; }
img { max-width: 100%; height: auto; border-radius: 8px; display: block; }
</style>"#;

/// What the panel needs to know beyond the session itself.
pub struct PanelView<'a> {
    pub stage: &'a Stage,
    pub is_first: bool,
    pub is_last: bool,
    pub state: &'a SessionState,
}

impl PanelView<'_> {
    pub fn image_source(&self) -> &str {
        self.state
            .current_image
            .as_deref()
            .unwrap_or(self.stage.image.as_str())
    }

    pub fn render(&self) -> String {
        let state = self.state;
        let image = if state.image_loading {
            r#"<div class="spinner">Loading…</div>"#.to_string()
        } else {
            format!(
                r#"<img src="{}" alt="Stage Image" />"#,
                escape(self.image_source())
            )
        };

        let options = [
            (DynamicImageMode::Both, "Both"),
            (DynamicImageMode::OnlyHere, "Only here"),
            (DynamicImageMode::InChat, "In chat"),
            (DynamicImageMode::Off, "Off"),
        ]
        .iter()
        .map(|(mode, label)| {
            format!(
                r#"<option value="{mode}"{}>{label}</option>"#,
                selected(*mode == state.dynamic_image_mode)
            )
        })
        .collect::<String>();

        let changing = disabled(state.image_changing);
        let thinking = disabled(state.thought_generating);

        format!(
            r#"{STYLE}
<div class="container">
  <div class="block navigation-block">
    <div class="flex-center">
      <button data-action="previous-stage"{prev}>◀ Previous</button>
      <div class="stage-title">Stage {number}: {name}</div>
      <button data-action="next-stage"{next}>Next ▶</button>
    </div>
  </div>
  <div class="block image-preview">{image}</div>
  <div class="block">
    <div class="control-group">
      <select id="automaticImage" data-action="image-mode"{changing}>{options}</select>
      <button data-action="change-image"{changing}>{change_label}</button>
    </div>
  </div>
  <div class="block">
    <div class="control-group">
      <label><input type="checkbox" data-action="dynamic-thought"{thought_checked}{thinking}> Dynamic Thought</label>
      <label><input type="checkbox" data-action="system-guidance"{guidance_checked}{thinking}> System Guidance</label>
    </div>
    <div class="control-group">
      <button data-action="generate-thought"{thinking}>{thought_label}</button>
      <button data-action="generate-guidance"{thinking}>Add Guidance</button>
    </div>
  </div>
  <div class="flex-center"><button data-action="close" class="close-button">Close Window</button></div>
</div>"#,
            prev = disabled(self.is_first),
            next = disabled(self.is_last),
            number = self.stage.number,
            name = escape(&self.stage.name),
            change_label = if state.image_changing {
                "Changing…"
            } else {
                "Change Image"
            },
            thought_checked = checked(state.dynamic_thought),
            guidance_checked = checked(state.system_guidance),
            thought_label = if state.thought_generating {
                "Thinking…"
            } else {
                "Generate Thought"
            },
        )
    }
}

fn disabled(flag: bool) -> &'static str {
    if flag { " disabled" } else { "" }
}

fn checked(flag: bool) -> &'static str {
    if flag { " checked" } else { "" }
}

fn selected(flag: bool) -> &'static str {
    if flag { " selected" } else { "" }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
