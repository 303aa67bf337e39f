//! Account emails: verification, password reset and welcome.
use crate::mailer::EmailMessage;

pub fn verify_url(base_url: &str, token: &str) -> String {
    format!("{}/verify-email?token={}", base_url.trim_end_matches('/'), token)
}

pub fn reset_url(base_url: &str, token: &str) -> String {
    format!("{}/reset-password?token={}", base_url.trim_end_matches('/'), token)
}

pub struct VerificationEmail<'a> {
    pub to: &'a str,
    pub name: &'a str,
    pub verify_url: &'a str,
}

impl VerificationEmail<'_> {
    pub fn render(&self) -> EmailMessage {
        EmailMessage {
            to: self.to.to_string(),
            subject: "Verify your email - TheRoofFax".to_string(),
            html: format!(
                r#"<p>Hi {name},</p>
<p>Thanks for signing up for TheRoofFax. Confirm your email address to activate your account:</p>
<p><a href="{url}">{url}</a></p>
<p>This link is valid for 24 hours.</p>
<p>If you did not create an account, you can ignore this email.</p>"#,
                name = html_escape::encode_safe(self.name),
                url = self.verify_url
            ),
        }
    }
}

pub struct PasswordResetEmail<'a> {
    pub to: &'a str,
    pub name: &'a str,
    pub reset_url: &'a str,
}

impl PasswordResetEmail<'_> {
    pub fn render(&self) -> EmailMessage {
        EmailMessage {
            to: self.to.to_string(),
            subject: "Reset your password - TheRoofFax".to_string(),
            html: format!(
                r#"<p>Hi {name},</p>
<p>We received a request to reset your TheRoofFax password. Choose a new one here:</p>
<p><a href="{url}">{url}</a></p>
<p>This link expires in 1 hour.</p>
<p>If you did not ask for a reset, no action is needed.</p>"#,
                name = html_escape::encode_safe(self.name),
                url = self.reset_url
            ),
        }
    }
}

pub struct WelcomeEmail<'a> {
    pub to: &'a str,
    pub name: &'a str,
    pub base_url: &'a str,
}

impl WelcomeEmail<'_> {
    pub fn render(&self) -> EmailMessage {
        EmailMessage {
            to: self.to.to_string(),
            subject: "Welcome to TheRoofFax".to_string(),
            html: format!(
                r#"<p>Welcome aboard, {name}!</p>
<p>Once your email is verified you can order roof reports and track inspections from your dashboard:</p>
<p><a href="{base}/dashboard">{base}/dashboard</a></p>"#,
                name = html_escape::encode_safe(self.name),
                base = self.base_url.trim_end_matches('/')
            ),
        }
    }
}
