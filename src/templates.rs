use tera::Tera;

pub const VERIFY_PAGE: &str = "verify.html";
pub const NOT_FOUND_PAGE: &str = "not_found.html";

/// Build the page templates. They are compiled into the binary so the
/// service does not depend on its working directory.
pub fn load() -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        ("base.html", include_str!("../templates/base.html")),
        (VERIFY_PAGE, include_str!("../templates/verify.html")),
        (NOT_FOUND_PAGE, include_str!("../templates/not_found.html")),
    ])?;
    Ok(tera)
}
