//! Per-host build script assembly
//!
//! [`assemble`] turns a host, the run's build options and the host's project
//! template into the complete script that host executes. The recipe runs in
//! a fixed order:
//!
//! 1. login profile bootstrap, command line echo, `EXITSTATUS=0`
//! 2. a custom command, which ends the script early
//! 3. repository preparation (clone or stash + fetch), or payload extraction
//! 4. checkout of `master`, the requested branch and subproject branches
//! 5. `git clean` of the working tree
//! 6. `cd` into the build directory
//! 7. `./configure`
//! 8. `make depend`
//! 9. `make <targets>`
//! 10. post-build steps
//! 11. trailer and optional cleanup
//!
//! The result is wrapped in a prologue and epilogue exactly once, after
//! which the length markers are computed.

use crate::document::{ScriptBuilder, ScriptDocument, SCRIPT_LEN_MARKER, SCRIPT_LEN_PLUS_ONE_MARKER};
use crate::marker::{escape_double_quoted, marker_echo, ACTIVITY_PREFIX};
use pb_core::{BuildOptions, BuildType, HostTarget, Project};
use tracing::debug;

/// Per-host values that are not part of the build options
#[derive(Debug, Clone, Copy)]
pub struct ScriptContext<'a> {
    /// Remote path the script is copied to
    pub destination: &'a str,
    /// Invocation echoed into the log for reference
    pub command_line: &'a str,
    /// `[configure]` qualifiers from the configuration file for this project
    pub configured_qualifiers: Option<&'a str>,
}

/// Build the script `target` runs for this build
pub fn assemble(
    target: &HostTarget,
    options: &BuildOptions,
    project: &dyn Project,
    context: &ScriptContext<'_>,
) -> ScriptDocument {
    let recipe = Recipe {
        target,
        options,
        project,
        context,
    };

    let mut body = ScriptBuilder::new();
    recipe.bootstrap(&mut body);

    if let Some(command) = &options.command {
        recipe.custom_command(&mut body, command);
    } else {
        if options.container.is_some() {
            recipe.extract_payload(&mut body);
        } else {
            recipe.prepare_repository(&mut body);
            recipe.checkout(&mut body);
            recipe.clean_tree(&mut body);
        }
        recipe.enter_build_directory(&mut body);
        recipe.configure(&mut body);
        recipe.make_depend(&mut body);
        recipe.make(&mut body);
        recipe.post_build(&mut body);
        recipe.trailer(&mut body);
    }

    let mut script = ScriptBuilder::new();
    recipe.prologue(&mut script);
    script.append(body);
    recipe.epilogue(&mut script);

    let document = script.finalize();
    debug!(
        host = %target.tag,
        lines = document.line_count(),
        "Assembled build script"
    );
    document
}

struct Recipe<'a> {
    target: &'a HostTarget,
    options: &'a BuildOptions,
    project: &'a dyn Project,
    context: &'a ScriptContext<'a>,
}

impl Recipe<'_> {
    fn container(&self) -> bool {
        self.options.container.is_some()
    }

    fn path(&self) -> &str {
        &self.target.remote_path
    }

    fn step(&self, script: &mut ScriptBuilder, label: &str) {
        script.blank().push("echo").push(marker_echo(label)).push("date");
    }

    fn prologue(&self, script: &mut ScriptBuilder) {
        let destination = self.context.destination;
        script.push(format!("# pbuild script for {}", self.target.tag));
        if self.options.diagnose || self.container() {
            script.push(format!("echo 'Executing script {}'", destination));
        } else {
            script.push(format!("rm {}", destination));
        }
        if self.container() {
            script.push(format!("SCRIPTNAME='{}'", destination));
        }
        script
            .push(format!(
                "echo \"Executing on host $HOSTNAME ({}: {})\"",
                escape_double_quoted(self.target.tag.as_str()),
                escape_double_quoted(&self.target.address)
            ))
            .push(format!("[ -d {path} ] || mkdir -p {path}", path = self.path()))
            .push(format!("cd {} || exit $?", self.path()))
            .blank();
    }

    fn epilogue(&self, script: &mut ScriptBuilder) {
        script
            .blank()
            .push(format!("echo {}Finishing up\\; status=$EXITSTATUS", ACTIVITY_PREFIX))
            .push("exit $EXITSTATUS");
    }

    fn bootstrap(&self, script: &mut ScriptBuilder) {
        script.extend([
            "# Find a login profile to source",
            "if [ -f /etc/profile ]; then",
            "    echo \"Sourcing /etc/profile\"",
            "    . /etc/profile",
            "fi",
            "if [ -f ~/.bash_profile ]; then",
            "    echo \"Sourcing ~/.bash_profile\"",
            "    . ~/.bash_profile",
            "elif [ -f ~/.bash_login ]; then",
            "    echo \"Sourcing ~/.bash_login\"",
            "    . ~/.bash_login",
            "elif [ -f ~/.profile ]; then",
            "    echo \"Sourcing ~/.profile\"",
            "    . ~/.profile",
            "else",
            "    echo \"WARNING: Unable to find login files to source!\"",
            "fi",
            "",
            "set +u",
            "[ -e /etc/PATH ] && export PATH=$PATH:`cat /etc/PATH`",
            "if [ -z \"$PKG_CONFIG_PATH\" -a -d /usr/local/lib/pkgconfig ]; then",
            "    export PKG_CONFIG_PATH=/usr/local/lib/pkgconfig",
            "fi",
            "",
            "echo",
        ]);
        script
            .push(format!(
                "echo 'Command line: {}'",
                self.context.command_line.replace('\'', "\"")
            ))
            .push("echo \"Starting at:  `date`\"")
            .push("EXITSTATUS=0");
    }

    fn custom_command(&self, script: &mut ScriptBuilder, command: &str) {
        script
            .blank()
            .push("echo")
            .push(marker_echo("custom command"))
            .push(format!("echo \"Command: {}\"", escape_double_quoted(command)))
            .push(format!("cd {} || exit $?", self.path()))
            .push(command)
            .push("EXITSTATUS=$?")
            .push("exit $EXITSTATUS");
    }

    fn prepare_repository(&self, script: &mut ScriptBuilder) {
        let path = self.path();
        let source = self.project.clone_source();

        self.step(script, "Preparing repository");
        script.extend([
            "pbuild_cleanup() {",
            "    echo 'Stashing local changes'",
            "    git stash",
            "    git submodule foreach --recursive git stash",
            "}",
            "pbuild_reclone() {",
        ]);
        script
            .push(format!("    echo 'Cloning {} into {}'", source, path))
            .push("    cd || return $?")
            .push(format!("    rm -rf {}", path))
            .push(format!("    git clone --recursive {} {} || return $?", source, path))
            .push(format!("    cd {}", path))
            .push("}");

        if self.options.force_clone {
            script.push("pbuild_reclone");
        } else {
            script.extend([
                "if [ ! -d .git ]; then",
                "    pbuild_reclone",
                "else",
                "    pbuild_cleanup",
                "    git fetch --recurse-submodules",
                "fi",
            ]);
        }
        script.extend([
            "EXITSTATUS=$?",
            "[ $EXITSTATUS -ne 0 ] && exit $EXITSTATUS",
            "BASE_DIRECTORY=`pwd -P`",
        ]);
    }

    fn checkout(&self, script: &mut ScriptBuilder) {
        self.step(script, "Checking out source");
        script.extend([
            "pbuild_checkout() {",
            "    echo \"Checking out '$2' in $1\"",
            "    ( cd \"$1\" && git checkout \"$2\" || exit $?",
            "      git symbolic-ref -q HEAD > /dev/null || exit 0",
            "      git pull --ff-only )",
            "}",
            "pbuild_checkout . master || exit $?",
            "git submodule update --init --recursive || exit $?",
        ]);

        if let Some(branch) = &self.options.branch {
            script
                .push(format!("pbuild_checkout . '{}' || exit $?", branch))
                .push("git submodule update --init --recursive || exit $?");
        }
        for sub in &self.options.subprojects {
            script.push(format!(
                "pbuild_checkout '{}' '{}' || exit $?",
                sub.directory, sub.branch
            ));
        }
    }

    fn clean_tree(&self, script: &mut ScriptBuilder) {
        self.step(script, "Cleaning working tree");
        script
            .push("git clean -fdx")
            .push("git submodule foreach --recursive git clean -fdx");
    }

    fn extract_payload(&self, script: &mut ScriptBuilder) {
        self.step(script, "Extracting binary payload");
        script
            .push(format!("SCRIPT_LEN={}", SCRIPT_LEN_MARKER))
            .push(format!("SCRIPT_LEN_PLUS_ONE={}", SCRIPT_LEN_PLUS_ONE_MARKER))
            .push(format!("rm -rf {}/*", self.path().trim_end_matches('/')))
            .push("TAIL_CQUAL=\"\"")
            .push("[ `uname` != \"SunOS\" ] && TAIL_CQUAL=\"-n\"")
            .push("tail $TAIL_CQUAL +${SCRIPT_LEN_PLUS_ONE} \"${SCRIPTNAME}\" | tar xf -")
            .push("EXITSTATUS=$?");
        if !self.options.diagnose {
            script.push("rm \"${SCRIPTNAME}\"");
        }
        script.extend([
            "if [ $EXITSTATUS -ne 0 ]; then",
            "    echo \"Failed: could not extract the binary payload\"",
            "    exit $EXITSTATUS",
            "fi",
            "echo \"Binary payload extracted\"",
            "BASE_DIRECTORY=`pwd -P`",
        ]);
    }

    fn enter_build_directory(&self, script: &mut ScriptBuilder) {
        let dir = self.project.build_directory();
        script
            .blank()
            .push(format!("if [ ! -d {} ]; then", dir))
            .push(format!("    echo \"Error: '{}' subdirectory does not exist!\"", dir))
            .push("    exit 1")
            .push("fi")
            .push(format!("cd {} || exit $?", dir));
    }

    fn configure(&self, script: &mut ScriptBuilder) {
        if !self.project.uses_configure_script() {
            return;
        }

        let extra = self
            .options
            .configure_override
            .as_deref()
            .or(self.context.configured_qualifiers);
        let mut qualifiers: Vec<&str> = [self.project.configure_qualifiers(), extra.unwrap_or("")]
            .into_iter()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .collect();
        if self.options.build_type == BuildType::Debug {
            qualifiers.push("--enable-debug");
        }
        let qualifiers = qualifiers.join(" ");

        self.step(script, "Determining debug/release");
        script.push(format!("echo \"Performing {} build\"", self.options.build_type));
        if !qualifiers.is_empty() {
            script.push(format!(
                "echo \"  (Configuration options: {})\"",
                escape_double_quoted(&qualifiers)
            ));
        }
        script
            .push("chmod ug+x ./configure")
            .push(format!("./configure {}", qualifiers).trim_end())
            .push("EXITSTATUS=$?")
            .push("[ $EXITSTATUS -ne 0 ] && exit $EXITSTATUS");
    }

    fn make_depend(&self, script: &mut ScriptBuilder) {
        if self.project.make_depend() {
            self.step(script, "make depend");
            script.push("make depend").push("echo");
        }
    }

    fn make(&self, script: &mut ScriptBuilder) {
        let Some(targets) = self.options.make_targets(self.project) else {
            return;
        };
        let command = format!("make {}", targets).trim_end().to_string();

        self.step(script, &command);
        if !self.options.test_attributes.is_empty() {
            script.push(format!(
                "SCX_TESTRUN_ATTRS=\"{}\"; export SCX_TESTRUN_ATTRS",
                self.options.test_attributes
            ));
        }
        if !self.options.test_list.is_empty() {
            script.push(format!(
                "SCX_TESTRUN_NAMES=\"{}\"; export SCX_TESTRUN_NAMES",
                escape_double_quoted(&self.options.test_list)
            ));
        }
        script.extend([
            command.as_str(),
            "MAKE_STATUS=$?",
            "if [ $MAKE_STATUS -ne 0 ]; then",
            "    EXITSTATUS=$MAKE_STATUS",
            "fi",
        ]);
    }

    fn post_build(&self, script: &mut ScriptBuilder) {
        let steps = self.project.post_build_steps();
        if steps.is_empty() {
            return;
        }

        self.step(script, "post-build steps");
        script.push("POST_STATUS=0");
        for step in steps {
            script
                .push("if [ $POST_STATUS -eq 0 ]; then")
                .push(format!("    {}", step))
                .push("    POST_STATUS=$?")
                .push("fi");
        }
        script.extend([
            "if [ $POST_STATUS -ne 0 ]; then",
            "    EXITSTATUS=$POST_STATUS",
            "fi",
        ]);
    }

    fn trailer(&self, script: &mut ScriptBuilder) {
        script.blank().push("echo").push("echo Ending at:  `date`");
        if self.options.cleanup && !self.container() {
            script.extend([
                "",
                "if [ $EXITSTATUS -eq 0 ]; then",
                "    cd $BASE_DIRECTORY",
                "    pbuild_cleanup",
                "fi",
            ]);
        }
    }
}
