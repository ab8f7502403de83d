//! Server-side HTML for the public share pages. Plain string templating;
//! these pages are printable, read-only, and carry no scripts.

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn paragraphs(body: &str) -> String {
    body.split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .map(|p| format!("<p>{}</p>\n", escape(p.trim()).replace('\n', "<br>")))
        .collect()
}

const PAGE_STYLE: &str = "body{font-family:Georgia,serif;max-width:46rem;margin:2rem auto;\
padding:0 1rem;line-height:1.5}h1{border-bottom:2px solid #333;padding-bottom:.3rem}\
.meta{color:#555;font-size:.9rem}@media print{.meta{display:none}}";

pub struct LessonPlanView {
    pub title: String,
    pub class_name: Option<String>,
    pub date: Option<String>,
    pub content: String,
}

pub fn lesson_plan_page(plan: &LessonPlanView) -> String {
    let mut meta = Vec::new();
    if let Some(class) = &plan.class_name {
        meta.push(escape(class));
    }
    if let Some(date) = &plan.date {
        meta.push(escape(date));
    }
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\">\
<title>{title}</title><style>{style}</style></head>\n<body>\n\
<h1>{title}</h1>\n<div class=\"meta\">{meta}</div>\n{body}</body></html>\n",
        title = escape(&plan.title),
        style = PAGE_STYLE,
        meta = meta.join(" &middot; "),
        body = paragraphs(&plan.content),
    )
}

pub struct SubDashView {
    pub date: String,
    pub content: String,
    pub profile: Vec<(String, String)>,
}

pub fn subdash_page(view: &SubDashView) -> String {
    let mut profile = String::new();
    if !view.profile.is_empty() {
        profile.push_str("<h2>Classroom notes</h2>\n<dl>\n");
        for (key, value) in &view.profile {
            profile.push_str(&format!(
                "<dt><strong>{}</strong></dt><dd>{}</dd>\n",
                escape(key),
                escape(value)
            ));
        }
        profile.push_str("</dl>\n");
    }
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\">\
<title>Substitute plan for {date}</title><style>{style}</style></head>\n<body>\n\
<h1>Substitute plan</h1>\n<div class=\"meta\">{date}</div>\n{body}{profile}</body></html>\n",
        date = escape(&view.date),
        style = PAGE_STYLE,
        body = paragraphs(&view.content),
        profile = profile,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_in_content() {
        let page = lesson_plan_page(&LessonPlanView {
            title: "Intro <script>".to_string(),
            class_name: None,
            date: None,
            content: "a & b".to_string(),
        });
        assert!(page.contains("Intro &lt;script&gt;"));
        assert!(page.contains("a &amp; b"));
        assert!(!page.contains("<script>"));
    }

    #[test]
    fn subdash_includes_profile_pairs() {
        let page = subdash_page(&SubDashView {
            date: "2024-05-01".to_string(),
            content: "Period 1: silent reading".to_string(),
            profile: vec![("Wifi".to_string(), "room code on desk".to_string())],
        });
        assert!(page.contains("Wifi"));
        assert!(page.contains("room code on desk"));
        assert!(page.contains("silent reading"));
    }
}
