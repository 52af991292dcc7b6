/// Environment-backed configuration for one module. `load` reads every
/// variable the implementor owns and panics on a missing one, so a
/// misconfigured service dies at boot rather than on the first request that
/// needs the value.
pub trait EnvVars {
    fn load() -> Self;
    fn get_env_var(&self, key: &str) -> String;
}
