//! JXA script builders for Xcode's scripting dictionary
//!
//! Every script addresses the workspace document by its path, so concurrent
//! sessions against different projects never act on the wrong window. String
//! values are embedded as JSON literals, which are valid JavaScript.

use std::path::Path;

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn js_string_array(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

fn path_literal(project: &Path) -> String {
    js_string(&project.to_string_lossy())
}

/// Wrap a body that has `app` and `ws` in scope
fn with_workspace(project: &Path, body: &str) -> String {
    format!(
        r#"(function() {{
  const app = Application('Xcode');
  const path = {path};
  const ws = app.workspaceDocuments().find(d => d.path() === path);
  if (!ws) {{ throw new Error("Can't get workspace document " + path); }}
{body}
}})()"#,
        path = path_literal(project),
        body = body
    )
}

pub fn list_schemes(project: &Path) -> String {
    with_workspace(
        project,
        "  return JSON.stringify(ws.schemes().map(s => s.name()));",
    )
}

pub fn list_destinations(project: &Path) -> String {
    with_workspace(
        project,
        r#"  return JSON.stringify(ws.runDestinations().map(d => ({
    name: d.name(),
    platform: d.platform(),
    architecture: d.architecture()
  })));"#,
    )
}

pub fn set_scheme(project: &Path, scheme: &str) -> String {
    with_workspace(
        project,
        &format!(
            r#"  const name = {name};
  const scheme = ws.schemes().find(s => s.name() === name);
  if (!scheme) {{ throw new Error("Can't get scheme " + name); }}
  ws.activeScheme = scheme;
  return ws.activeScheme().name();"#,
            name = js_string(scheme)
        ),
    )
}

pub fn set_destination(project: &Path, destination: &str) -> String {
    with_workspace(
        project,
        &format!(
            r#"  const name = {name};
  const dest = ws.runDestinations().find(d => d.name() === name);
  if (!dest) {{ throw new Error("Can't get run destination " + name); }}
  ws.activeRunDestination = dest;
  return ws.activeRunDestination().name();"#,
            name = js_string(destination)
        ),
    )
}

/// Each trigger returns the scheme action result id
pub fn build(project: &Path) -> String {
    with_workspace(project, "  return ws.build().id();")
}

pub fn clean(project: &Path) -> String {
    with_workspace(project, "  return ws.clean().id();")
}

pub fn test(project: &Path, arguments: &[String]) -> String {
    let body = if arguments.is_empty() {
        "  return ws.test().id();".to_string()
    } else {
        format!(
            "  return ws.test({{withCommandLineArguments: {}}}).id();",
            js_string_array(arguments)
        )
    };
    with_workspace(project, &body)
}

pub fn run(project: &Path, arguments: &[String]) -> String {
    let body = if arguments.is_empty() {
        "  return ws.run().id();".to_string()
    } else {
        format!(
            "  return ws.run({{withCommandLineArguments: {}}}).id();",
            js_string_array(arguments)
        )
    };
    with_workspace(project, &body)
}

pub fn debug(project: &Path, scheme: Option<&str>, skip_building: bool) -> String {
    let mut options = vec![format!("skipBuilding: {}", skip_building)];
    if let Some(scheme) = scheme {
        options.push(format!("scheme: {}", js_string(scheme)));
    }
    with_workspace(
        project,
        &format!("  return ws.debug({{{}}}).id();", options.join(", ")),
    )
}

pub fn stop(project: &Path) -> String {
    with_workspace(project, "  ws.stop();\n  return 'stopped';")
}

/// `{completed, status, error}` for a scheme action, or `null` when unknown
pub fn action_status(project: &Path, action_id: &str) -> String {
    with_workspace(
        project,
        &format!(
            r#"  const id = {id};
  const result = ws.schemeActionResults().find(r => r.id() === id);
  if (!result) {{ return JSON.stringify(null); }}
  let error = null;
  try {{ error = result.errorMessage(); }} catch (e) {{}}
  return JSON.stringify({{ completed: result.completed(), status: result.status(), error: error }});"#,
            id = js_string(action_id)
        ),
    )
}

pub fn workspace_info(project: &Path) -> String {
    with_workspace(
        project,
        r#"  let scheme = null, destination = null;
  try { scheme = ws.activeScheme().name(); } catch (e) {}
  try { destination = ws.activeRunDestination().name(); } catch (e) {}
  return JSON.stringify({
    name: ws.name(),
    path: ws.path(),
    loaded: ws.loaded(),
    activeScheme: scheme,
    activeRunDestination: destination
  });"#,
    )
}

pub fn open_project(project: &Path) -> String {
    format!(
        r#"(function() {{
  const app = Application('Xcode');
  app.open({path});
  return 'opened';
}})()"#,
        path = path_literal(project)
    )
}

/// `true` once the project's workspace document exists and has loaded
pub fn project_loaded(project: &Path) -> String {
    format!(
        r#"(function() {{
  const app = Application('Xcode');
  const path = {path};
  const ws = app.workspaceDocuments().find(d => d.path() === path);
  return ws ? String(ws.loaded()) : 'false';
}})()"#,
        path = path_literal(project)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn project() -> PathBuf {
        PathBuf::from("/Users/dev/My \"App\"/MyApp.xcodeproj")
    }

    #[test]
    fn test_paths_and_names_are_escaped() {
        let script = set_scheme(&project(), "My'Scheme");
        assert!(script.contains(r#"const path = "/Users/dev/My \"App\"/MyApp.xcodeproj";"#));
        assert!(script.contains(r#"const name = "My'Scheme";"#));
        assert!(script.contains("ws.activeScheme = scheme;"));
    }

    #[test]
    fn test_trigger_arguments() {
        let args = vec!["-UITestMode".to_string(), "YES".to_string()];
        assert!(test(&project(), &args)
            .contains(r#"ws.test({withCommandLineArguments: ["-UITestMode","YES"]}).id()"#));
        assert!(run(&project(), &[]).contains("ws.run().id()"));
        assert!(debug(&project(), Some("MyApp"), true)
            .contains(r#"ws.debug({skipBuilding: true, scheme: "MyApp"}).id()"#));
    }

    #[test]
    fn test_scripts_are_self_invoking() {
        for script in [
            list_schemes(&project()),
            stop(&project()),
            open_project(&project()),
            project_loaded(&project()),
        ] {
            assert!(script.starts_with("(function() {"));
            assert!(script.ends_with("})()"));
        }
    }
}
