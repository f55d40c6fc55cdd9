use serde::Deserialize;
use validator::Validate;

/// Registration form (multipart text fields)
#[derive(Debug, Clone, Default, Validate)]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 30, message = "username is required (max 30 characters)"))]
    pub username: String,

    #[validate(length(min = 1, max = 255, message = "name is required (max 255 characters)"))]
    pub name: String,

    #[validate(
        email(message = "email must be a valid address"),
        length(max = 255, message = "email is too long")
    )]
    pub email: String,

    #[validate(length(min = 8, max = 255, message = "password must be 8-255 characters"))]
    pub password: String,

    #[validate(length(max = 150, message = "bio must be at most 150 characters"))]
    pub bio: String,

    #[validate(
        url(message = "website must be a valid URL"),
        length(max = 255, message = "website is too long")
    )]
    pub website: Option<String>,

    #[validate(length(min = 1, max = 255, message = "phone is required"))]
    pub phone: String,

    #[validate(length(min = 1, max = 20, message = "language is required (max 20 characters)"))]
    pub language: String,

    pub privacy: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginInput {
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,

    #[validate(length(min = 1, max = 255, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ForgotPasswordInput {
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResetPasswordInput {
    #[validate(length(min = 8, max = 255, message = "password must be 8-255 characters"))]
    pub password: String,
}

/// Partial profile update. `None` leaves the stored value untouched; the form
/// parser maps empty strings to `None`.
#[derive(Debug, Clone, Default, Validate)]
pub struct EditInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    #[validate(email(message = "email must be a valid address"), length(max = 255))]
    pub email: Option<String>,

    #[validate(length(min = 8, max = 255, message = "password must be 8-255 characters"))]
    pub password: Option<String>,

    #[validate(length(max = 150, message = "bio must be at most 150 characters"))]
    pub bio: Option<String>,

    #[validate(url(message = "website must be a valid URL"), length(max = 255))]
    pub website: Option<String>,

    #[validate(length(min = 1, max = 255))]
    pub phone: Option<String>,

    #[validate(length(min = 1, max = 20))]
    pub language: Option<String>,

    pub privacy: Option<bool>,
}

impl EditInput {
    /// Treat empty strings as "no change"
    pub fn normalized(self) -> Self {
        fn present(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.is_empty())
        }

        Self {
            name: present(self.name),
            email: present(self.email),
            password: present(self.password),
            bio: present(self.bio),
            website: present(self.website),
            phone: present(self.phone),
            language: present(self.language),
            privacy: self.privacy,
        }
    }
}
