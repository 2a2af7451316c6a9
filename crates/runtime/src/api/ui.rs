//! Single-page front end served at `/`

use axum::response::Html;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>SSN Sentinel</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 48rem; margin: 2rem auto; padding: 0 1rem; color: #1f2933; }
  h1 { text-align: center; }
  textarea { width: 100%; min-height: 8rem; font: inherit; padding: .5rem; box-sizing: border-box; }
  .row { display: flex; gap: .75rem; align-items: center; margin: .75rem 0; flex-wrap: wrap; }
  input[type=password] { flex: 1; min-width: 12rem; padding: .4rem; }
  button { padding: .5rem 1.25rem; font: inherit; cursor: pointer; }
  #result { margin-top: 1rem; }
  .blocked { background: #fde8e8; border: 1px solid #f5a3a3; padding: .75rem; border-radius: .4rem; }
  .clear { background: #e6f6ec; border: 1px solid #9bd8b0; padding: .75rem; border-radius: .4rem; }
  .error { background: #fff4e5; border: 1px solid #f5c37a; padding: .75rem; border-radius: .4rem; }
  mark.ssn { background: #f8b4b4; }
  mark.similar { background: #fce588; }
  pre { white-space: pre-wrap; background: #f5f7fa; padding: .5rem; border-radius: .3rem; }
  details { margin-top: .75rem; }
</style>
</head>
<body>
<h1>Ask me anything, but not anything about SSN!</h1>
<textarea id="text" placeholder="Type your question here and press Ctrl+Enter..."></textarea>
<div class="row">
  <label><input type="checkbox" id="think" checked> Think mode</label>
  <input type="password" id="token" placeholder="API token (if required)">
  <button id="send">Check</button>
  <button id="clear" type="button">Clear</button>
</div>
<div id="result"></div>
<script>
const $ = (id) => document.getElementById(id);

function escapeHtml(s) {
  return s.replace(/[&<>"']/g, (c) => ({'&':'&amp;','<':'&lt;','>':'&gt;','"':'&quot;',"'":'&#39;'}[c]));
}

function highlight(text, detections) {
  const enc = new TextEncoder(), dec = new TextDecoder();
  const bytes = enc.encode(text);
  let out = '', pos = 0;
  for (const d of detections) {
    out += escapeHtml(dec.decode(bytes.slice(pos, d.start)));
    const cls = d.category === 'SSN' ? 'ssn' : 'similar';
    out += `<mark class="${cls}" title="${escapeHtml(d.category || 'unlabelled')}">` +
           escapeHtml(dec.decode(bytes.slice(d.start, d.end))) + '</mark>';
    pos = d.end;
  }
  return out + escapeHtml(dec.decode(bytes.slice(pos)));
}

async function check() {
  const text = $('text').value;
  if (!text.trim()) return;
  const headers = { 'Content-Type': 'application/json' };
  if ($('token').value) headers['Authorization'] = 'Bearer ' + $('token').value;
  $('result').innerHTML = '<p>Checking... long inputs and think mode can take a while.</p>';
  $('send').disabled = true;
  try {
    const resp = await fetch('/api/v1/detect', {
      method: 'POST', headers,
      body: JSON.stringify({ text, mode: $('think').checked ? 'think' : 'nothink' }),
    });
    const body = await resp.json().catch(() => ({ error: resp.statusText, code: String(resp.status) }));
    if (!resp.ok) {
      let html = `<div class="error"><strong>Request failed (${escapeHtml(body.code || String(resp.status))}):</strong> ${escapeHtml(body.error || '')}</div>`;
      if (body.details && body.details.raw_transcript) {
        html += `<details><summary>Raw model output</summary><pre>${escapeHtml(body.details.raw_transcript)}</pre></details>`;
      }
      $('result').innerHTML = html;
      return;
    }
    const ssn = body.detections.some((d) => d.category === 'SSN');
    let html = ssn
      ? '<div class="blocked"><strong>Sensitive SSN is detected, and the query is blocked.</strong></div>'
      : `<div class="clear">No SSN detected (${body.detections.length} similar number(s)).</div>`;
    html += `<p>${highlight(text, body.detections)}</p>`;
    for (const w of body.warnings) html += `<p><em>Warning: ${escapeHtml(w.kind)} (${w.count})</em></p>`;
    if (body.transcript.reasoning) {
      html += `<details><summary>Model reasoning</summary><pre>${escapeHtml(body.transcript.reasoning)}</pre></details>`;
    }
    html += `<p><small>${body.usage.prompt_tokens} prompt + ${body.usage.completion_tokens} completion tokens, ${body.timing.total_ms} ms</small></p>`;
    $('result').innerHTML = html;
  } catch (e) {
    $('result').innerHTML = `<div class="error">${escapeHtml(String(e))}</div>`;
  } finally {
    $('send').disabled = false;
  }
}

$('send').addEventListener('click', check);
$('clear').addEventListener('click', () => { $('text').value = ''; $('result').innerHTML = ''; });
$('text').addEventListener('keydown', (e) => { if (e.key === 'Enter' && e.ctrlKey) check(); });
</script>
</body>
</html>
"#;

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
