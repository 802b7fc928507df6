#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Condvar, Mutex, MutexGuard},
    time::Duration,
};

use vidpress::{
    CompressError, CompressResult, Engine, EngineAssets, EngineEvent, EngineFactory, EventSink,
    LogKind,
};

/// What the scripted engine does on its next `exec`.
#[derive(Clone, Debug)]
pub struct Script {
    pub fail_load: bool,
    pub lines: Vec<String>,
    pub progress: Vec<f64>,
    pub exit_code: i32,
    pub output: Option<Vec<u8>>,
    /// Block inside `exec` until the engine is terminated.
    pub block_exec: bool,
    /// Block inside `load` until the engine is terminated, then report success.
    pub block_load: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            fail_load: false,
            lines: Vec::new(),
            progress: Vec::new(),
            exit_code: 0,
            output: Some(b"compressed".to_vec()),
            block_exec: false,
            block_load: false,
        }
    }
}

#[derive(Default)]
pub struct Probe {
    pub creates: Mutex<usize>,
    pub terminates: Mutex<usize>,
    pub calls: Mutex<Vec<String>>,
    execs: Mutex<usize>,
    exec_cv: Condvar,
    loads: Mutex<usize>,
    load_cv: Condvar,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn bump(count: &Mutex<usize>, cv: &Condvar) {
    *lock(count) += 1;
    cv.notify_all();
}

fn wait_for_count(count: &Mutex<usize>, cv: &Condvar, n: usize, what: &str) {
    let guard = lock(count);
    let (guard, timeout) = cv
        .wait_timeout_while(guard, Duration::from_secs(10), |c| *c < n)
        .unwrap_or_else(|e| e.into_inner());
    assert!(!timeout.timed_out(), "{what} #{n} never started (saw {})", *guard);
}

impl Probe {
    pub fn creates(&self) -> usize {
        *lock(&self.creates)
    }

    pub fn terminates(&self) -> usize {
        *lock(&self.terminates)
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Wait until `exec` has been entered `n` times in total.
    pub fn wait_for_exec(&self, n: usize) {
        wait_for_count(&self.execs, &self.exec_cv, n, "exec");
    }

    /// Wait until `load` has been entered `n` times in total.
    pub fn wait_for_load(&self, n: usize) {
        wait_for_count(&self.loads, &self.load_cv, n, "load");
    }

    fn record(&self, call: String) {
        lock(&self.calls).push(call);
    }
}

#[derive(Clone, Default)]
pub struct ScriptedFactory {
    pub script: Arc<Mutex<Script>>,
    pub probe: Arc<Probe>,
}

impl ScriptedFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn edit(&self, f: impl FnOnce(&mut Script)) {
        f(&mut *lock(&self.script));
    }
}

impl EngineFactory for ScriptedFactory {
    fn create(&self, events: EventSink) -> CompressResult<Box<dyn Engine>> {
        *lock(&self.probe.creates) += 1;
        Ok(Box::new(ScriptedEngine {
            script: Arc::clone(&self.script),
            probe: Arc::clone(&self.probe),
            events,
            files: Mutex::new(HashMap::new()),
            terminated: Mutex::new(false),
            terminated_cv: Condvar::new(),
        }))
    }
}

pub struct ScriptedEngine {
    script: Arc<Mutex<Script>>,
    probe: Arc<Probe>,
    events: EventSink,
    files: Mutex<HashMap<String, Vec<u8>>>,
    terminated: Mutex<bool>,
    terminated_cv: Condvar,
}

impl ScriptedEngine {
    fn wait_until_terminated(&self) {
        let guard = lock(&self.terminated);
        let _guard = self
            .terminated_cv
            .wait_while(guard, |terminated| !*terminated)
            .unwrap_or_else(|e| e.into_inner());
    }

    fn check_alive(&self) -> CompressResult<()> {
        if *lock(&self.terminated) {
            return Err(CompressError::cancelled("scripted engine terminated"));
        }
        Ok(())
    }
}

impl Engine for ScriptedEngine {
    fn load(&self, _assets: &EngineAssets) -> CompressResult<()> {
        self.probe.record("load".to_string());
        bump(&self.probe.loads, &self.probe.load_cv);
        let script = lock(&self.script).clone();
        if script.fail_load {
            return Err(CompressError::engine("could not fetch core assets"));
        }
        if script.block_load {
            self.wait_until_terminated();
        }
        // Load chatter must not reach the job log.
        (self.events)(EngineEvent::log(LogKind::Stdout, "fps=999 loading core"));
        Ok(())
    }

    fn write_file(&self, name: &str, bytes: &[u8]) -> CompressResult<()> {
        self.check_alive()?;
        self.probe.record(format!("write {name}"));
        lock(&self.files).insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn exec(&self, args: &[String]) -> CompressResult<i32> {
        self.check_alive()?;
        self.probe.record("exec".to_string());

        let input = args
            .iter()
            .position(|a| a == "-i")
            .and_then(|i| args.get(i + 1))
            .ok_or_else(|| CompressError::engine("no -i argument"))?;
        if !lock(&self.files).contains_key(input) {
            return Err(CompressError::engine(format!("{input} was not written")));
        }

        let script = lock(&self.script).clone();
        for line in &script.lines {
            (self.events)(EngineEvent::log(LogKind::Stderr, line.clone()));
        }
        for p in &script.progress {
            (self.events)(EngineEvent::progress(*p));
        }

        bump(&self.probe.execs, &self.probe.exec_cv);

        if script.block_exec {
            self.wait_until_terminated();
            // Output from an abandoned command must be ignored.
            (self.events)(EngineEvent::log(LogKind::Stderr, "frame=9 fps=1.0"));
            return Err(CompressError::cancelled("killed mid-command"));
        }

        if let (Some(out), Some(name)) = (script.output, args.last()) {
            lock(&self.files).insert(name.clone(), out);
        }
        Ok(script.exit_code)
    }

    fn read_file(&self, name: &str) -> CompressResult<Option<Vec<u8>>> {
        self.check_alive()?;
        self.probe.record(format!("read {name}"));
        Ok(lock(&self.files).get(name).cloned())
    }

    fn delete_file(&self, name: &str) -> CompressResult<bool> {
        self.check_alive()?;
        self.probe.record(format!("delete {name}"));
        Ok(lock(&self.files).remove(name).is_some())
    }

    fn terminate(&self) -> CompressResult<()> {
        let mut terminated = lock(&self.terminated);
        if !*terminated {
            *terminated = true;
            *lock(&self.probe.terminates) += 1;
            self.terminated_cv.notify_all();
        }
        Ok(())
    }
}

pub fn status_lines(fps: &[f64]) -> Vec<String> {
    fps.iter()
        .enumerate()
        .map(|(i, f)| {
            format!(
                "frame={} fps={f:.1} q=28.0 size={}kB time=00:00:0{}.00 bitrate=1000.0kbits/s speed=1.0x",
                i + 1,
                (i + 1) * 10,
                i % 10
            )
        })
        .collect()
}
