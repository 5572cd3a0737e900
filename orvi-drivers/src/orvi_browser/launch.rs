use orvi_common::BrowserSettings;

/// Chrome command-line arguments for a portal session.
pub fn build_launch_arguments(settings: &BrowserSettings) -> Vec<String> {
    let (width, height) = settings.window_size;
    let mut args = vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-infobars".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-sandbox".to_string(),
        "--disable-extensions".to_string(),
        // Translation prompts cover the portal's login form.
        "--disable-features=Translate".to_string(),
        "--no-first-run".to_string(),
        format!("--window-size={width},{height}"),
        format!("--lang={}", settings.lang),
    ];
    if settings.headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
    }
    args.extend(settings.extra_args.iter().cloned());
    args
}

/// Script run after each navigation to hide the most common automation
/// markers.
pub const CORE_EVASIONS: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    if (!window.chrome) window.chrome = { runtime: {} };
"#;
