use axum::{
    extract::{Multipart, Path, State},
    http::header::SET_COOKIE,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use log::info;
use std::sync::Arc;

use crate::{
    error::AppError,
    flash::{self, Flash},
    uploads::UploadedFile,
    views, AppState,
};

const UPLOAD_SUCCESS: &str = "Image uploaded and caption generated successfully!";
const EDIT_SUCCESS: &str = "Entry updated successfully!";

#[derive(Default)]
struct EntryForm {
    file: Option<UploadedFile>,
    caption: Option<String>,
}

impl EntryForm {
    /// The attached file, if the browser sent one with a name.
    fn chosen_file(&mut self) -> Option<UploadedFile> {
        self.file.take().filter(|file| !file.file_name.is_empty())
    }
}

async fn read_form(mut multipart: Multipart) -> Result<EntryForm, AppError> {
    let mut form = EntryForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?.to_vec();
                form.file = Some(UploadedFile { file_name, bytes });
            }
            Some("caption") => form.caption = Some(field.text().await?),
            _ => {}
        }
    }
    Ok(form)
}

fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.parse().map_err(|_| AppError::NotFound)
}

fn redirect_to_gallery(message: &str) -> Response {
    (
        AppendHeaders([(SET_COOKIE, flash::set_cookie(message))]),
        Redirect::to("/gallery"),
    )
        .into_response()
}

pub async fn upload_form(flash: Flash) -> Response {
    flash.render(|message| views::entry_form(None, message))
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    flash: Flash,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let mut form = read_form(multipart).await?;
    let named = form
        .chosen_file()
        .and_then(|file| file.sanitized_name().map(|name| (file, name)));
    let Some((file, name)) = named else {
        return Ok(flash.render(|message| views::entry_form(None, message)));
    };

    let stored = state.uploads.save(&name, file.bytes).await?;
    let image_path = stored.path_string();
    let caption = state.captioner.caption(stored.image).await?;
    let id = state.store.create(image_path.clone(), caption).await?;
    info!("created entry {id} for {image_path}");

    Ok(redirect_to_gallery(UPLOAD_SUCCESS))
}

pub async fn edit_form(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    flash: Flash,
) -> Result<Response, AppError> {
    let entry = state.store.get(parse_id(&id)?).await?;
    Ok(flash.render(|message| views::entry_form(Some(&entry), message)))
}

/// Replaces the image and/or caption of an entry. A new image keeps the
/// existing caption; an empty caption keeps the existing text. A file name
/// with nothing storable in it is rejected rather than ignored.
pub async fn edit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    state.store.get(id).await?;

    let mut form = read_form(multipart).await?;
    let image_path = match form.chosen_file() {
        Some(file) => {
            let name = file
                .sanitized_name()
                .ok_or_else(|| AppError::InvalidFileName(file.file_name.clone()))?;
            Some(state.uploads.save(&name, file.bytes).await?.path_string())
        }
        None => None,
    };
    let caption = form
        .caption
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());

    state.store.update(id, image_path.clone(), caption).await?;
    match image_path {
        Some(path) => info!("updated entry {id}, image now {path}"),
        None => info!("updated entry {id}"),
    }

    Ok(redirect_to_gallery(EDIT_SUCCESS))
}

pub async fn gallery(
    State(state): State<Arc<AppState>>,
    flash: Flash,
) -> Result<Response, AppError> {
    let entries = state.store.list_all().await?;
    Ok(flash.render(|message| views::gallery(&entries, message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        caption::{CaptionError, Captioner},
        store::EntryStore,
        uploads::UploadDir,
    };
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{
            header::{CONTENT_TYPE, COOKIE, LOCATION},
            Request, StatusCode,
        },
        Router,
    };
    use image::{ImageOutputFormat, RgbImage};
    use tower::ServiceExt;

    const BOUNDARY: &str = "gallery-test-boundary";
    const STUB_CAPTION: &str = "a small black square";

    struct StubCaptioner;

    #[async_trait]
    impl Captioner for StubCaptioner {
        fn model_id(&self) -> &str {
            "stub"
        }

        async fn caption(&self, _image: RgbImage) -> Result<String, CaptionError> {
            Ok(STUB_CAPTION.to_string())
        }
    }

    struct Harness {
        app: Router,
        store: EntryStore,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        harness_with_limit(10 * 1024 * 1024).await
    }

    async fn harness_with_limit(max_upload_bytes: usize) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = EntryStore::open_in_memory().unwrap();
        let uploads = UploadDir::create(dir.path().join("static")).await.unwrap();
        let state = Arc::new(AppState {
            store: store.clone(),
            captioner: Arc::new(StubCaptioner),
            uploads,
        });
        Harness {
            app: crate::app(state, max_upload_bytes),
            store,
            _dir: dir,
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    enum Part<'a> {
        File(&'a str, &'a [u8]),
        Text(&'a str, &'a str),
    }

    fn multipart(uri: &str, parts: &[Part]) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::File(file_name, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                }
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Response) {
        let response = app.clone().oneshot(request).await.unwrap();
        (response.status(), response)
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn assert_redirects_to_gallery(status: StatusCode, response: &Response) {
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "/gallery");
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("flash="));
    }

    #[tokio::test]
    async fn upload_creates_a_captioned_entry() {
        let h = harness().await;
        let bytes = png(4, 4);

        let (status, response) = send(&h.app, multipart("/", &[Part::File("cat.png", &bytes)])).await;
        assert_redirects_to_gallery(status, &response);

        let entries = h.store.list_all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].caption, STUB_CAPTION);
        assert!(entries[0].image_path.ends_with("_cat.png"));
        assert_eq!(std::fs::read(&entries[0].image_path).unwrap(), bytes);
    }

    #[tokio::test]
    async fn upload_sanitizes_the_client_name() {
        let h = harness().await;
        let bytes = png(2, 2);

        let (status, response) = send(
            &h.app,
            multipart("/", &[Part::File("../../etc/evil name.png", &bytes)]),
        )
        .await;
        assert_redirects_to_gallery(status, &response);

        let entry = &h.store.list_all().await.unwrap()[0];
        assert!(entry.image_path.ends_with("_etc_evil_name.png"));
        assert!(!entry.image_path.contains(".."));
    }

    #[tokio::test]
    async fn upload_without_a_file_rerenders_the_form() {
        let h = harness().await;

        let (status, response) = send(&h.app, multipart("/", &[Part::File("", b"")])).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body_text(response).await.contains("Upload an image"));

        let (status, _) = send(&h.app, multipart("/", &[Part::Text("caption", "ignored")])).await;
        assert_eq!(status, StatusCode::OK);

        assert!(h.store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_of_a_non_image_is_rejected() {
        let h = harness().await;

        let (status, _) = send(&h.app, multipart("/", &[Part::File("notes.png", b"hello")])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(h.store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_over_the_body_limit_is_rejected() {
        let h = harness_with_limit(64).await;
        let bytes = png(64, 64);

        let (status, _) = send(&h.app, multipart("/", &[Part::File("big.png", &bytes)])).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(h.store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn edit_with_a_non_image_keeps_the_entry() {
        let h = harness().await;
        let id = h
            .store
            .create("static/abc_dog.png".into(), "a dog".into())
            .await
            .unwrap();

        let (status, _) = send(
            &h.app,
            multipart(
                &format!("/edit/{id}"),
                &[Part::File("notes.png", b"hello"), Part::Text("caption", "changed")],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let entry = h.store.get(id).await.unwrap();
        assert_eq!(entry.image_path, "static/abc_dog.png");
        assert_eq!(entry.caption, "a dog");
    }

    #[tokio::test]
    async fn edit_with_an_unstorable_file_name_is_rejected() {
        let h = harness().await;
        let id = h
            .store
            .create("static/abc_dog.png".into(), "a dog".into())
            .await
            .unwrap();
        let bytes = png(2, 2);

        let (status, _) = send(
            &h.app,
            multipart(&format!("/edit/{id}"), &[Part::File("..", &bytes)]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            h.store.get(id).await.unwrap().image_path,
            "static/abc_dog.png"
        );
    }

    #[tokio::test]
    async fn edit_of_an_unknown_entry_is_not_found() {
        let h = harness().await;

        let (status, _) = send(&h.app, get("/edit/42")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&h.app, get("/edit/abc")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&h.app, multipart("/edit/42", &[Part::Text("caption", "x")])).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn edit_form_shows_the_current_entry() {
        let h = harness().await;
        let id = h
            .store
            .create("static/abc_dog.png".into(), "a dog".into())
            .await
            .unwrap();

        let (status, response) = send(&h.app, get(&format!("/edit/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("a dog"));
        assert!(html.contains("static/abc_dog.png"));
    }

    #[tokio::test]
    async fn edit_with_only_a_caption_keeps_the_image() {
        let h = harness().await;
        let id = h
            .store
            .create("static/abc_dog.png".into(), "a dog".into())
            .await
            .unwrap();

        let (status, response) = send(
            &h.app,
            multipart(
                &format!("/edit/{id}"),
                &[Part::File("", b""), Part::Text("caption", "a sleeping dog")],
            ),
        )
        .await;
        assert_redirects_to_gallery(status, &response);

        let entry = h.store.get(id).await.unwrap();
        assert_eq!(entry.image_path, "static/abc_dog.png");
        assert_eq!(entry.caption, "a sleeping dog");
    }

    #[tokio::test]
    async fn edit_with_a_new_image_and_empty_caption_keeps_the_caption() {
        let h = harness().await;
        let id = h
            .store
            .create("static/abc_dog.png".into(), "a dog".into())
            .await
            .unwrap();
        let bytes = png(6, 3);

        let (status, response) = send(
            &h.app,
            multipart(
                &format!("/edit/{id}"),
                &[Part::File("puppy.png", &bytes), Part::Text("caption", "")],
            ),
        )
        .await;
        assert_redirects_to_gallery(status, &response);

        let entry = h.store.get(id).await.unwrap();
        assert!(entry.image_path.ends_with("_puppy.png"));
        assert_eq!(std::fs::read(&entry.image_path).unwrap(), bytes);
        assert_eq!(entry.caption, "a dog");
    }

    #[tokio::test]
    async fn gallery_lists_every_entry_and_is_stable() {
        let h = harness().await;
        for n in 0..3 {
            h.store
                .create(format!("static/{n}.png"), format!("caption number {n}"))
                .await
                .unwrap();
        }

        let (status, first) = send(&h.app, get("/gallery")).await;
        assert_eq!(status, StatusCode::OK);
        let first = body_text(first).await;
        assert_eq!(first.matches(views::ENTRY_MARKER).count(), 3);
        for n in 0..3 {
            assert!(first.contains(&format!("caption number {n}")));
        }

        let (_, second) = send(&h.app, get("/gallery")).await;
        assert_eq!(body_text(second).await, first);
    }

    #[tokio::test]
    async fn gallery_shows_the_flash_once() {
        let h = harness().await;
        let request = Request::builder()
            .uri("/gallery")
            .header(COOKIE, flash::set_cookie(EDIT_SUCCESS).split(';').next().unwrap())
            .body(Body::empty())
            .unwrap();

        let (status, response) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        let cleared = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
        assert!(cleared.contains("Max-Age=0"));
        assert!(body_text(response).await.contains(EDIT_SUCCESS));
    }
}
