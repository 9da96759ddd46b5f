//! Messaging Functions
//!
//! Sending copies the message into a fresh message environment that travels
//! with it into the receiver's mailbox, so the sender's environment can be
//! cleared or freed right away. Sending is allowed from any thread.

use crate::heap::copy_term;
use crate::nif_env::{env_mut, EnvKind, ErlNifEnv};
use crate::process::{get_global_process_table, Message};
use crate::{ErlNifPid, ERL_NIF_TERM};
use entities_data_handling::eterm;
use std::os::raw::c_int;

/// Pid of the calling process
///
/// # Returns
///
/// * `pid` - Filled in with the calling process
/// * Null - `caller_env` is not bound to a process
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_self()` - C implementation
pub unsafe extern "C" fn enif_self(caller_env: *mut ErlNifEnv, pid: *mut ErlNifPid) -> *mut ErlNifPid {
    match env_mut(caller_env).and_then(|env| env.owner()) {
        Some(owner) if !pid.is_null() => {
            *pid = ErlNifPid {
                pid: eterm::make_pid(owner),
            };
            pid
        }
        _ => std::ptr::null_mut(),
    }
}

/// Send a message to a local process
///
/// # Arguments
///
/// * `caller_env` - Environment of the calling function; null when called
///   from a thread the runtime did not create
/// * `to_pid` - Receiver
/// * `msg_env` - Environment `msg` lives in, or null if `msg` belongs to
///   `caller_env`
/// * `msg` - The message
///
/// # Returns
///
/// * `1` - Delivered; `msg_env` (if given) has been cleared
/// * `0` - The receiver is not alive; `msg_env` is untouched
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_send()` - C implementation
pub unsafe extern "C" fn enif_send(
    _caller_env: *mut ErlNifEnv,
    to_pid: *const ErlNifPid,
    msg_env: *mut ErlNifEnv,
    msg: ERL_NIF_TERM,
) -> c_int {
    let Some(to) = to_pid.as_ref() else {
        return 0;
    };
    if !eterm::is_pid(to.pid) || !eterm::is_value(msg) {
        return 0;
    }
    let Some(process) = get_global_process_table().lookup(eterm::pid_number(to.pid)) else {
        return 0;
    };
    if !process.is_alive() {
        return 0;
    }
    let mut carrier = Box::new(ErlNifEnv::new(EnvKind::Message));
    let term = copy_term(carrier.heap_mut(), msg);
    if !process.deliver(Message::new(carrier, term)) {
        return 0;
    }
    if let Some(msg_env) = env_mut(msg_env) {
        msg_env.heap_mut().clear();
    }
    1
}

/// True if `pid` names a live local process
pub unsafe extern "C" fn enif_is_process_alive(_env: *mut ErlNifEnv, pid: *const ErlNifPid) -> c_int {
    match pid.as_ref() {
        Some(pid) if eterm::is_pid(pid.pid) => {
            c_int::from(get_global_process_table().is_alive(eterm::pid_number(pid.pid)))
        }
        _ => 0,
    }
}

/// True if the process `env` belongs to is still alive
///
/// Dirty functions poll this to stop early when their caller has exited.
pub unsafe extern "C" fn enif_is_current_process_alive(env: *mut ErlNifEnv) -> c_int {
    match env_mut(env).and_then(|env| env.owner()) {
        Some(owner) => c_int::from(get_global_process_table().is_alive(owner)),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::enif_is_identical;
    use crate::nif_env::{enif_alloc_env, enif_free_env};
    use crate::term_creation::{enif_make_atom, enif_make_tuple_from_array};

    #[test]
    fn test_self_requires_a_process() {
        let mut pid = ErlNifPid { pid: 0 };
        let mut bound = ErlNifEnv::for_process(11);
        let mut independent = ErlNifEnv::new(EnvKind::ProcessIndependent);
        unsafe {
            assert!(!enif_self(&mut bound, &mut pid).is_null());
            assert_eq!(pid.pid, eterm::make_pid(11));
            assert!(enif_self(&mut independent, &mut pid).is_null());
        }
    }

    #[test]
    fn test_send_copies_and_clears() {
        let process = get_global_process_table().spawn();
        let to = ErlNifPid {
            pid: process.pid_term(),
        };
        unsafe {
            let env = enif_alloc_env();
            let hello = enif_make_atom(env, c"hello".as_ptr());
            let msg = enif_make_tuple_from_array(env, [hello, hello].as_ptr(), 2);
            assert_eq!(enif_send(std::ptr::null_mut(), &to, env, msg), 1);
            assert_eq!((*env).heap().object_count(), 0);

            let received = process.try_receive().unwrap();
            let expected = enif_make_tuple_from_array(env, [hello, hello].as_ptr(), 2);
            assert_eq!(enif_is_identical(received.term(), expected), 1);
            enif_free_env(env);
        }
        get_global_process_table().exit(process.id());
    }

    #[test]
    fn test_send_to_dead_process_fails() {
        let process = get_global_process_table().spawn();
        let to = ErlNifPid {
            pid: process.pid_term(),
        };
        get_global_process_table().exit(process.id());
        unsafe {
            assert_eq!(enif_is_process_alive(std::ptr::null_mut(), &to), 0);
            assert_eq!(enif_send(std::ptr::null_mut(), &to, std::ptr::null_mut(), eterm::NIL), 0);
        }
    }
}
