/// Canonical schema. The live database is converged onto this at start-up.
pub const CURRENT_SCHEMA: &str = r#"
PRAGMA foreign_keys = 1;
PRAGMA user_version = 2;

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL DEFAULT '',
    role TEXT NOT NULL DEFAULT 'user',
    first_name TEXT,
    last_name TEXT,
    job_title TEXT,
    location TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS user_sessions (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    token TEXT NOT NULL UNIQUE,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    expires_at TIMESTAMP NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS skill_categories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    color TEXT
);

CREATE TABLE IF NOT EXISTS skill_subcategories (
    id INTEGER PRIMARY KEY,
    category_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    FOREIGN KEY (category_id) REFERENCES skill_categories (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS skill_templates (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    category TEXT NOT NULL,
    category_id INTEGER,
    subcategory_id INTEGER,
    description TEXT,
    is_recommended BOOLEAN NOT NULL DEFAULT FALSE,
    target_level TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (category_id) REFERENCES skill_categories (id) ON DELETE SET NULL,
    FOREIGN KEY (subcategory_id) REFERENCES skill_subcategories (id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS user_skills (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    skill_template_id INTEGER NOT NULL,
    level TEXT NOT NULL,
    certification TEXT,
    credly_link TEXT,
    notes TEXT,
    description TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (user_id, skill_template_id),
    FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE,
    FOREIGN KEY (skill_template_id) REFERENCES skill_templates (id)
);

CREATE TABLE IF NOT EXISTS clients (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    industry TEXT,
    contact_name TEXT,
    contact_email TEXT,
    website TEXT,
    notes TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    client_id INTEGER,
    start_date DATE,
    end_date DATE,
    location TEXT,
    confluence_link TEXT,
    status TEXT NOT NULL DEFAULT 'planning',
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (client_id) REFERENCES clients (id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS project_skills (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL,
    skill_template_id INTEGER NOT NULL,
    required_level TEXT NOT NULL DEFAULT 'intermediate',
    importance TEXT NOT NULL DEFAULT 'medium',
    UNIQUE (project_id, skill_template_id),
    FOREIGN KEY (project_id) REFERENCES projects (id) ON DELETE CASCADE,
    FOREIGN KEY (skill_template_id) REFERENCES skill_templates (id)
);

CREATE TABLE IF NOT EXISTS project_resources (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    role TEXT NOT NULL,
    allocation INTEGER NOT NULL DEFAULT 100,
    start_date DATE,
    end_date DATE,
    notes TEXT,
    UNIQUE (project_id, user_id),
    FOREIGN KEY (project_id) REFERENCES projects (id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS project_resource_histories (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    action TEXT NOT NULL,
    previous_role TEXT,
    new_role TEXT,
    previous_allocation INTEGER,
    new_allocation INTEGER,
    performed_by INTEGER,
    note TEXT,
    date TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (project_id) REFERENCES projects (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS pending_skill_updates (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    user_skill_id INTEGER,
    skill_template_id INTEGER NOT NULL,
    level TEXT NOT NULL,
    certification TEXT,
    credly_link TEXT,
    notes TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    is_update BOOLEAN NOT NULL DEFAULT FALSE,
    submitted_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    reviewed_at TIMESTAMP,
    reviewed_by INTEGER,
    review_notes TEXT,
    FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE,
    FOREIGN KEY (user_skill_id) REFERENCES user_skills (id),
    FOREIGN KEY (skill_template_id) REFERENCES skill_templates (id)
);

CREATE TABLE IF NOT EXISTS endorsements (
    id INTEGER PRIMARY KEY,
    user_skill_id INTEGER NOT NULL,
    endorser_id INTEGER NOT NULL,
    endorsee_id INTEGER NOT NULL,
    comment TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (user_skill_id, endorser_id),
    FOREIGN KEY (user_skill_id) REFERENCES user_skills (id),
    FOREIGN KEY (endorser_id) REFERENCES users (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    type TEXT NOT NULL,
    content TEXT NOT NULL,
    is_read BOOLEAN NOT NULL DEFAULT FALSE,
    related_user_skill_id INTEGER,
    related_user_id INTEGER,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE,
    FOREIGN KEY (related_user_skill_id) REFERENCES user_skills (id)
);

CREATE TABLE IF NOT EXISTS report_settings (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    frequency TEXT NOT NULL DEFAULT 'weekly',
    day_of_week INTEGER,
    day_of_month INTEGER,
    recipients TEXT NOT NULL DEFAULT '',
    base_url TEXT,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    last_sent_at TIMESTAMP,
    next_scheduled_at TIMESTAMP,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_user_skills_template ON user_skills (skill_template_id);
CREATE INDEX IF NOT EXISTS idx_project_skills_template ON project_skills (skill_template_id);
CREATE INDEX IF NOT EXISTS idx_pending_updates_status ON pending_skill_updates (status);
CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications (user_id, is_read);
CREATE INDEX IF NOT EXISTS idx_sessions_expiry ON user_sessions (expires_at);
"#;
