//! File set written by `setup_vite_app`.

use serde_json::json;

/// One scaffolded file, relative to the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldFile {
    /// Relative path.
    pub path: &'static str,
    /// Full content.
    pub content: String,
}

/// Render the Vite + React + Tailwind starter for `port`.
///
/// `allowed_hosts` are the backend's preview proxy suffixes; Vite rejects
/// requests whose Host header is not allow-listed.
pub fn vite_app(port: u16, allowed_hosts: &[&str]) -> Vec<ScaffoldFile> {
    vec![
        ScaffoldFile {
            path: "package.json",
            content: package_json(),
        },
        ScaffoldFile {
            path: "vite.config.js",
            content: vite_config(port, allowed_hosts),
        },
        ScaffoldFile {
            path: "tailwind.config.js",
            content: TAILWIND_CONFIG.to_string(),
        },
        ScaffoldFile {
            path: "postcss.config.js",
            content: POSTCSS_CONFIG.to_string(),
        },
        ScaffoldFile {
            path: "index.html",
            content: INDEX_HTML.to_string(),
        },
        ScaffoldFile {
            path: "src/main.jsx",
            content: MAIN_JSX.to_string(),
        },
        ScaffoldFile {
            path: "src/App.jsx",
            content: APP_JSX.to_string(),
        },
        ScaffoldFile {
            path: "src/index.css",
            content: INDEX_CSS.to_string(),
        },
    ]
}

fn package_json() -> String {
    let manifest = json!({
        "name": "sandbox-app",
        "private": true,
        "version": "0.0.0",
        "type": "module",
        "scripts": {
            "dev": "vite",
            "build": "vite build",
            "preview": "vite preview"
        },
        "dependencies": {
            "react": "^18.2.0",
            "react-dom": "^18.2.0"
        },
        "devDependencies": {
            "@vitejs/plugin-react": "^4.0.0",
            "autoprefixer": "^10.4.16",
            "postcss": "^8.4.31",
            "tailwindcss": "^3.3.0",
            "vite": "^4.3.9"
        }
    });
    // serde_json's pretty printer cannot fail on a `Value`.
    let mut out = serde_json::to_string_pretty(&manifest).unwrap_or_default();
    out.push('\n');
    out
}

fn vite_config(port: u16, allowed_hosts: &[&str]) -> String {
    let hosts = std::iter::once(&"localhost")
        .chain(allowed_hosts)
        .map(|h| format!("'{h}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"import {{ defineConfig }} from 'vite'
import react from '@vitejs/plugin-react'

export default defineConfig({{
  plugins: [react()],
  server: {{
    host: '0.0.0.0',
    port: {port},
    strictPort: true,
    hmr: false,
    allowedHosts: [{hosts}]
  }}
}})
"#
    )
}

const TAILWIND_CONFIG: &str = r#"/** @type {import('tailwindcss').Config} */
export default {
  content: [
    "./index.html",
    "./src/**/*.{js,ts,jsx,tsx}",
  ],
  theme: {
    extend: {},
  },
  plugins: [],
}
"#;

const POSTCSS_CONFIG: &str = r#"export default {
  plugins: {
    tailwindcss: {},
    autoprefixer: {},
  },
}
"#;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Sandbox App</title>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="/src/main.jsx"></script>
  </body>
</html>
"#;

const MAIN_JSX: &str = r#"import React from 'react'
import ReactDOM from 'react-dom/client'
import App from './App.jsx'
import './index.css'

ReactDOM.createRoot(document.getElementById('root')).render(
  <React.StrictMode>
    <App />
  </React.StrictMode>,
)
"#;

const APP_JSX: &str = r#"function App() {
  return (
    <div className="min-h-screen bg-gray-900 text-white flex items-center justify-center p-4">
      <div className="text-center max-w-2xl">
        <p className="text-lg text-gray-400">
          Sandbox ready. Start building your app.
        </p>
      </div>
    </div>
  )
}

export default App
"#;

const INDEX_CSS: &str = r#"@tailwind base;
@tailwind components;
@tailwind utilities;

body {
  margin: 0;
  font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', 'Roboto', sans-serif;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_set() {
        let files = vite_app(5173, &[".e2b.app"]);
        let paths: Vec<_> = files.iter().map(|f| f.path).collect();
        assert_eq!(
            paths,
            [
                "package.json",
                "vite.config.js",
                "tailwind.config.js",
                "postcss.config.js",
                "index.html",
                "src/main.jsx",
                "src/App.jsx",
                "src/index.css",
            ]
        );
    }

    #[test]
    fn test_package_json_declares_react_and_vite() {
        let manifest: serde_json::Value = serde_json::from_str(&package_json()).unwrap();
        assert!(manifest["dependencies"]["react"].is_string());
        assert!(manifest["devDependencies"]["vite"].is_string());
        assert_eq!(manifest["scripts"]["dev"], "vite");
    }

    #[test]
    fn test_vite_config_binds_port_and_hosts() {
        let config = vite_config(3000, &[".vercel.run", ".example.dev"]);
        assert!(config.contains("host: '0.0.0.0'"));
        assert!(config.contains("port: 3000"));
        assert!(config.contains("allowedHosts: ['localhost', '.vercel.run', '.example.dev']"));

        let bare = vite_config(5173, &[]);
        assert!(bare.contains("allowedHosts: ['localhost']"));
    }
}
