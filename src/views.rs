use axum::http::StatusCode;

use crate::{store::ImageEntry, uploads::public_url};

pub const ENTRY_MARKER: &str = r#"<article class="entry""#;

const STYLE: &str = r#"
        * {
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }

        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, Cantarell, sans-serif;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            min-height: 100vh;
            padding: 20px;
        }

        .container {
            background: white;
            border-radius: 20px;
            box-shadow: 0 20px 60px rgba(0,0,0,0.3);
            max-width: 900px;
            margin: 0 auto;
            padding: 40px;
        }

        nav {
            display: flex;
            gap: 20px;
            margin-bottom: 30px;
        }

        nav a, .edit-link {
            color: #667eea;
            font-weight: 600;
            text-decoration: none;
        }

        h1 {
            color: #333;
            margin-bottom: 20px;
            font-size: 2em;
        }

        .flash {
            background: #eefbf0;
            border: 2px solid #b5e8c0;
            color: #23763a;
            padding: 15px;
            border-radius: 10px;
            margin-bottom: 20px;
        }

        form {
            display: flex;
            flex-direction: column;
            gap: 15px;
        }

        .upload-area {
            border: 3px dashed #667eea;
            border-radius: 15px;
            padding: 40px 20px;
            text-align: center;
            background: #f8f9ff;
        }

        textarea {
            border: 2px solid #e0e0e0;
            border-radius: 10px;
            padding: 10px;
            font: inherit;
            min-height: 80px;
        }

        button {
            background: #667eea;
            color: white;
            border: none;
            border-radius: 20px;
            padding: 12px 24px;
            font-size: 1em;
            font-weight: 600;
            cursor: pointer;
        }

        .preview-image {
            max-width: 100%;
            border-radius: 10px;
            box-shadow: 0 4px 15px rgba(0,0,0,0.1);
        }

        .grid {
            display: grid;
            grid-template-columns: repeat(auto-fill, minmax(240px, 1fr));
            gap: 20px;
        }

        .entry {
            background: #f8f9ff;
            border-radius: 10px;
            padding: 15px;
        }

        .entry img {
            width: 100%;
            border-radius: 10px;
            margin-bottom: 10px;
        }

        .result-text {
            color: #333;
            line-height: 1.6;
        }

        .meta-info {
            color: #666;
            font-size: 0.85em;
            margin-top: 10px;
            word-break: break-all;
        }
"#;

/// Escapes text for HTML element content and quoted attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, flash: Option<&str>, body: &str) -> String {
    let flash = flash
        .map(|message| format!(r#"<div class="flash">{}</div>"#, escape(message)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>{STYLE}</style>
</head>
<body>
    <div class="container">
        <nav><a href="/">Upload</a><a href="/gallery">Gallery</a></nav>
        {flash}
        {body}
    </div>
</body>
</html>
"#,
        title = escape(title),
    )
}

/// The upload form when `entry` is `None`, the edit form otherwise.
pub fn entry_form(entry: Option<&ImageEntry>, flash: Option<&str>) -> String {
    let body = match entry {
        None => r#"<h1>Upload an image</h1>
        <form method="post" action="/" enctype="multipart/form-data">
            <div class="upload-area">
                <input type="file" name="file" accept="image/*">
            </div>
            <button type="submit">Upload and caption</button>
        </form>"#
            .to_string(),
        Some(entry) => format!(
            r#"<h1>Edit entry #{id}</h1>
        <img class="preview-image" src="{src}" alt="{caption}">
        <p class="meta-info">{path}</p>
        <form method="post" action="/edit/{id}" enctype="multipart/form-data">
            <div class="upload-area">
                <input type="file" name="file" accept="image/*">
            </div>
            <textarea name="caption">{caption}</textarea>
            <button type="submit">Save</button>
        </form>"#,
            id = entry.id,
            src = escape(&public_url(&entry.image_path)),
            path = escape(&entry.image_path),
            caption = escape(&entry.caption),
        ),
    };

    let title = if entry.is_some() { "Edit entry" } else { "Upload" };
    layout(title, flash, &body)
}

pub fn gallery(entries: &[ImageEntry], flash: Option<&str>) -> String {
    let items: String = entries
        .iter()
        .map(|entry| {
            format!(
                r#"
            {ENTRY_MARKER} id="entry-{id}">
                <img src="{src}" alt="{caption}">
                <p class="result-text">{caption}</p>
                <p class="meta-info">#{id} &middot; {path}</p>
                <a class="edit-link" href="/edit/{id}">Edit</a>
            </article>"#,
                id = entry.id,
                src = escape(&public_url(&entry.image_path)),
                path = escape(&entry.image_path),
                caption = escape(&entry.caption),
            )
        })
        .collect();

    let body = if entries.is_empty() {
        r#"<h1>Gallery</h1>
        <p class="meta-info">No images yet.</p>"#
            .to_string()
    } else {
        format!(
            r#"<h1>Gallery</h1>
        <section class="grid">{items}
        </section>"#
        )
    };

    layout("Gallery", flash, &body)
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    let title = status.to_string();
    let body = format!(
        r#"<h1>{}</h1>
        <p class="result-text">{}</p>"#,
        escape(&title),
        escape(message)
    );
    layout(&title, None, &body)
}
