/// Where a variable value came from
///
/// The precedence table in [VariableSource::precedence] is the contract, not the declaration order. Lowest to
/// highest:
///
/// | source                        | precedence |
/// |-------------------------------|-----------:|
/// | `Undefined`                   | 0          |
/// | `Default`                     | 1          |
/// | `ConfigFile`                  | 2          |
/// | `VariableFile`                | 3          |
/// | `VariableFileExplicit`        | 4          |
/// | `CommandLineVariable`         | 5          |
/// | `EnvironmentVariable`         | 6          |
/// | `CommandLineVariableExplicit` | 7          |
/// | `ComputedOverride`            | 8          |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableSource {
    #[default]
    Undefined,
    /// `default` of a `variable` declaration in the terraform sources
    Default,
    /// declared by the tool's own configuration
    ConfigFile,
    /// variable file declared by configuration
    VariableFile,
    /// `-var-file` on the command line
    VariableFileExplicit,
    /// `-var` declared by configuration
    CommandLineVariable,
    /// `TF_VAR_*`
    EnvironmentVariable,
    /// `-var` on the command line
    CommandLineVariableExplicit,
    /// computed by the tool itself, beats everything
    ComputedOverride,
}

impl VariableSource {
    pub const fn precedence(self) -> u8 {
        match self {
            VariableSource::Undefined => 0,
            VariableSource::Default => 1,
            VariableSource::ConfigFile => 2,
            VariableSource::VariableFile => 3,
            VariableSource::VariableFileExplicit => 4,
            VariableSource::CommandLineVariable => 5,
            VariableSource::EnvironmentVariable => 6,
            VariableSource::CommandLineVariableExplicit => 7,
            VariableSource::ComputedOverride => 8,
        }
    }

    /// Supplied directly as a command line token
    pub const fn is_explicit(self) -> bool {
        matches!(
            self,
            VariableSource::VariableFileExplicit | VariableSource::CommandLineVariableExplicit
        )
    }
}

impl PartialOrd for VariableSource {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VariableSource {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.precedence().cmp(&other.precedence())
    }
}

impl std::fmt::Display for VariableSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            VariableSource::Undefined => "undefined",
            VariableSource::Default => "default",
            VariableSource::ConfigFile => "config file",
            VariableSource::VariableFile => "variable file",
            VariableSource::VariableFileExplicit => "-var-file",
            VariableSource::CommandLineVariable => "configured -var",
            VariableSource::EnvironmentVariable => "environment",
            VariableSource::CommandLineVariableExplicit => "-var",
            VariableSource::ComputedOverride => "computed",
        })
    }
}
