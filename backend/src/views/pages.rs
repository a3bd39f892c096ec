use actix_web::http::header::{ContentType, LOCATION};
use actix_web::{HttpRequest, HttpResponse};
use html_escape::{encode_double_quoted_attribute, encode_text};
use shared::{ClassDistribution, PredictionResponse};

use super::flash::{self, FlashMessage};

/// Redirect, optionally leaving a flash message for the target page.
pub fn redirect(location: &str, message: Option<FlashMessage>) -> HttpResponse {
    let mut response = HttpResponse::Found();
    response.append_header((LOCATION, location));
    if let Some(message) = message {
        response.cookie(message.to_cookie());
    }
    response.finish()
}

/// Wraps `body` in the site layout, consuming any pending flash message.
pub fn render(req: &HttpRequest, title: &str, user: Option<&str>, body: &str) -> HttpResponse {
    let flash = flash::peek(req);
    let flash_html = flash
        .as_ref()
        .map(|f| format!(r#"<div class="flash {}">{}</div>"#, f.level, encode_text(&f.text)))
        .unwrap_or_default();

    let nav = match user {
        Some(name) => format!(
            r#"<a href="/index">Upload</a> <a href="/performance">Performance</a> <span>Signed in as {}</span> <a href="/logout">Log out</a>"#,
            encode_text(name)
        ),
        None => r#"<a href="/">Home</a> <a href="/performance">Performance</a> <a href="/login">Log in</a> <a href="/signup">Sign up</a>"#.to_string(),
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>{title} - Chest X-ray Classifier</title></head>
<body>
<nav>{nav}</nav>
{flash_html}
<main>
{body}
</main>
</body>
</html>"#,
        title = encode_text(title),
    );

    let mut response = HttpResponse::Ok();
    response.insert_header(ContentType::html());
    if flash.is_some() {
        response.cookie(flash::removal_cookie());
    }
    response.body(html)
}

pub fn home() -> String {
    r#"<h1>Pneumonia detection from chest X-rays</h1>
<p>Upload a chest X-ray image and the classifier will label it NORMAL or PNEUMONIA with a confidence score.</p>
<p><a href="/login">Log in</a> or <a href="/signup">create an account</a> to get started.</p>"#
        .to_string()
}

fn credentials_form(action: &str, button: &str) -> String {
    format!(
        r#"<form method="post" action="{action}">
<label>Username <input type="text" name="username" required></label>
<label>Password <input type="password" name="password" required></label>
<button type="submit">{button}</button>
</form>"#
    )
}

pub fn signup() -> String {
    format!("<h1>Sign up</h1>\n{}", credentials_form("/signup", "Sign up"))
}

pub fn login() -> String {
    format!("<h1>Log in</h1>\n{}", credentials_form("/login", "Log in"))
}

pub fn upload_form(allowed: &[&str], max_bytes: usize) -> String {
    let accept = allowed
        .iter()
        .map(|ext| format!(".{}", ext))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        r#"<h1>Upload an X-ray</h1>
<form method="post" action="/predict" enctype="multipart/form-data">
<input type="file" name="file" accept="{accept}" required>
<button type="submit">Predict</button>
</form>
<p>Allowed types: {types}. Maximum size: {mib} MiB.</p>"#,
        types = allowed.join(", "),
        mib = max_bytes / (1024 * 1024),
    )
}

pub fn result(prediction: &PredictionResponse) -> String {
    let rows = prediction
        .probabilities
        .iter()
        .map(|p| {
            format!(
                "<tr><td>{}</td><td>{:.2}%</td></tr>",
                encode_text(&p.label),
                shared::round_percent(p.probability)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"<h1>Result</h1>
<p class="prediction">Prediction: <strong>{label}</strong></p>
<p class="confidence">Confidence: <strong>{confidence:.2}%</strong></p>
<p class="file">File: {name}</p>
<img src="{src}" alt="{alt}" width="300">
<table>
{rows}
</table>
<p><a href="/index">Classify another image</a></p>"#,
        label = encode_text(&prediction.label),
        confidence = prediction.confidence_percent,
        src = encode_double_quoted_attribute(&prediction.image_url),
        alt = encode_double_quoted_attribute(&prediction.file_name),
        name = encode_text(&prediction.file_name),
    )
}

pub fn performance(distribution: &ClassDistribution) -> String {
    let total = distribution.total().max(1) as f64;
    let bars = distribution
        .labels
        .iter()
        .zip(&distribution.values)
        .map(|(label, value)| {
            let width = (*value as f64 / total * 100.0).round();
            format!(
                r#"<div class="bar"><span>{}</span> <div style="width:{}%;background:#4a7;">&nbsp;</div> <span>{}</span></div>"#,
                encode_text(label),
                width,
                value
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "<h1>Training data distribution</h1>\n{}\n<p>Total images: {}</p>",
        bars,
        distribution.total()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use shared::ClassProbability;

    #[actix_web::test]
    async fn user_text_is_escaped() {
        let req = TestRequest::default()
            .cookie(FlashMessage::error("<script>x</script>").to_cookie())
            .to_http_request();
        let resp = render(&req, "A & B", Some("<b>eve</b>"), "");
        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let body = String::from_utf8_lossy(&body);
        assert!(body.contains("&lt;script&gt;x&lt;/script&gt;"));
        assert!(body.contains("Signed in as &lt;b&gt;eve&lt;/b&gt;"));
        assert!(body.contains("<title>A &amp; B"));
        assert!(!body.contains("<script>"));
    }

    #[test]
    fn redirect_sets_location_and_flash() {
        let resp = redirect("/login", Some(FlashMessage::info("You have been logged out.")));
        assert_eq!(resp.status(), 302);
        assert_eq!(resp.headers().get(LOCATION).unwrap(), "/login");
        assert!(resp.cookies().any(|c| c.name() == flash::FLASH_COOKIE));
    }

    #[test]
    fn render_consumes_flash() {
        let req = TestRequest::default()
            .cookie(FlashMessage::error("<b>bad</b>").to_cookie())
            .to_http_request();
        let resp = render(&req, "Log in", None, &login());
        let removal = resp.cookies().find(|c| c.name() == flash::FLASH_COOKIE).unwrap();
        assert_eq!(removal.value(), "");
    }

    #[test]
    fn result_page_shows_label_and_percentage() {
        let html = result(&PredictionResponse {
            label: "PNEUMONIA".into(),
            class_index: 1,
            confidence: 0.9734,
            confidence_percent: 97.34,
            probabilities: vec![
                ClassProbability { label: "NORMAL".into(), probability: 0.0266 },
                ClassProbability { label: "PNEUMONIA".into(), probability: 0.9734 },
            ],
            image_url: "/static/uploads/abc.png".into(),
            file_name: "<scan>.png".into(),
        });
        assert!(html.contains("<strong>PNEUMONIA</strong>"));
        assert!(html.contains("97.34%"));
        assert!(html.contains("&lt;scan&gt;.png"));
    }

    #[test]
    fn performance_lists_every_class() {
        let html = performance(&ClassDistribution {
            labels: vec!["NORMAL".into(), "PNEUMONIA".into()],
            values: vec![1341, 3875],
        });
        assert!(html.contains("NORMAL") && html.contains("1341"));
        assert!(html.contains("PNEUMONIA") && html.contains("3875"));
        assert!(html.contains("Total images: 5216"));
    }
}
