//! End-to-end command tests over the single-process backend.
//!
//! Everything a script can do in a one-rank world: lifecycle,
//! communicator management, self-messaging, collectives, nonblocking
//! requests, and the error messages a `catch` would observe.

use mpish::{Interp, LocalBackend, Shell};

fn shell() -> Shell {
    Shell::new(Interp::new(Box::new(LocalBackend::new())))
}

fn initialized_shell() -> Shell {
    let mut sh = shell();
    sh.eval_script("mpi::init").unwrap();
    sh
}

#[test]
fn lifecycle_errors_are_catchable_messages() {
    let mut sh = shell();
    let err = sh.eval_script("mpi::finalize").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Calling mpi::finalize before mpi::init is erroneous."
    );

    sh.eval_script("mpi::init").unwrap();
    let err = sh.eval_script("mpi::init").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Calling mpi::init multiple times is erroneous."
    );

    sh.eval_script("mpi::finalize").unwrap();
    let err = sh.eval_script("mpi::finalize").unwrap_err();
    assert_eq!(err.to_string(), "Calling mpi::finalize twice is erroneous.");
}

#[test]
fn size_and_rank_of_builtin_comms() {
    let mut sh = initialized_shell();
    assert_eq!(
        sh.eval_script("mpi::comm_size mpi::comm_world").unwrap(),
        "1"
    );
    assert_eq!(
        sh.eval_script("mpi::comm_rank mpi::comm_world").unwrap(),
        "0"
    );
    assert_eq!(
        sh.eval_script("mpi::comm_size mpi::comm_self").unwrap(),
        "1"
    );
}

#[test]
fn unknown_communicator_names_the_command() {
    let mut sh = initialized_shell();
    let err = sh.eval_script("mpi::comm_size mpi::comm99").unwrap_err();
    assert_eq!(
        err.to_string(),
        "mpi::comm_size: unknown communicator: mpi::comm99"
    );
}

#[test]
fn null_communicator_is_invalid_for_transfers() {
    let mut sh = initialized_shell();
    let err = sh
        .eval_script("mpi::probe 0 0 mpi::comm_null")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "mpi::probe: invalid communicator: mpi::comm_null"
    );
    let err = sh
        .eval_script("mpi::barrier mpi::comm_null")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "mpi::barrier: invalid communicator: mpi::comm_null"
    );
}

#[test]
fn comm_split_labels_and_undefined_color() {
    let mut sh = initialized_shell();
    let sub = sh
        .eval_script("mpi::comm_split mpi::comm_world 5 0")
        .unwrap();
    assert_eq!(sub, "mpi::comm0");
    assert_eq!(
        sh.eval_script(&format!("mpi::comm_size {sub}")).unwrap(),
        "1"
    );

    // A rank that opts out gets the null communicator back.
    assert_eq!(
        sh.eval_script("mpi::comm_split mpi::comm_world mpi::undefined 0")
            .unwrap(),
        "mpi::comm_null"
    );

    let err = sh
        .eval_script("mpi::comm_split mpi::comm_world -3 0")
        .unwrap_err();
    assert_eq!(err.to_string(), "mpi::comm_split: invalid color argument");
}

#[test]
fn send_and_recv_loop_back() {
    let mut sh = initialized_shell();
    sh.eval_script("mpi::send {1 2 3} mpi::int 0 7 mpi::comm_world")
        .unwrap();
    let out = sh
        .eval_script("mpi::recv mpi::int mpi::any_source mpi::any_tag mpi::comm_world")
        .unwrap();
    assert_eq!(out, "1 2 3");
}

#[test]
fn auto_data_is_transferred_verbatim() {
    let mut sh = initialized_shell();
    sh.eval_script("mpi::send {hello there} mpi::auto 0 0 mpi::comm_world")
        .unwrap();
    let out = sh
        .eval_script("mpi::recv mpi::auto 0 0 mpi::comm_world")
        .unwrap();
    assert_eq!(out, "hello there");
}

#[test]
fn recv_fills_the_status_array() {
    let mut sh = initialized_shell();
    sh.eval_script("mpi::send {1.5 2.5} mpi::double 0 3 mpi::comm_world")
        .unwrap();
    let out = sh
        .eval_script("mpi::recv mpi::double mpi::any_source mpi::any_tag mpi::comm_world st")
        .unwrap();
    assert_eq!(out, "1.5 2.5");
    assert_eq!(sh.interp().get_var("st(MPI_SOURCE)"), Some("0"));
    assert_eq!(sh.interp().get_var("st(MPI_TAG)"), Some("3"));
    assert_eq!(sh.interp().get_var("st(MPI_ERROR)"), Some("0"));
    assert_eq!(sh.interp().get_var("st(COUNT_CHAR)"), Some("16"));
    assert_eq!(sh.interp().get_var("st(COUNT_INT)"), Some("4"));
    assert_eq!(sh.interp().get_var("st(COUNT_DOUBLE)"), Some("2"));
}

#[test]
fn stale_status_entries_are_cleared() {
    let mut sh = initialized_shell();
    sh.interp().set_var("st(LEFTOVER)", "1".into());
    sh.eval_script("mpi::send x mpi::auto 0 0 mpi::comm_world")
        .unwrap();
    sh.eval_script("mpi::recv mpi::auto 0 0 mpi::comm_world st")
        .unwrap();
    assert_eq!(sh.interp().get_var("st(LEFTOVER)"), None);
    assert_eq!(sh.interp().get_var("st(COUNT_CHAR)"), Some("1"));
}

#[test]
fn unparsable_elements_transfer_as_zero() {
    let mut sh = initialized_shell();
    sh.eval_script("mpi::send {1 banana 3} mpi::int 0 0 mpi::comm_world")
        .unwrap();
    let out = sh
        .eval_script("mpi::recv mpi::int 0 0 mpi::comm_world")
        .unwrap();
    assert_eq!(out, "1 0 3");
}

#[test]
fn isend_then_wait_returns_empty() {
    let mut sh = initialized_shell();
    let req = sh
        .eval_script("mpi::isend {9 8} mpi::int 0 1 mpi::comm_world")
        .unwrap();
    assert_eq!(req, "mpi::req0");
    assert_eq!(sh.eval_script(&format!("mpi::wait {req}")).unwrap(), "");
    // The message is deliverable afterwards.
    assert_eq!(
        sh.eval_script("mpi::recv mpi::int 0 1 mpi::comm_world")
            .unwrap(),
        "9 8"
    );
}

#[test]
fn irecv_after_send_completes_at_wait() {
    let mut sh = initialized_shell();
    sh.eval_script("mpi::send {4 5} mpi::int 0 2 mpi::comm_world")
        .unwrap();
    let req = sh
        .eval_script("mpi::irecv mpi::int mpi::any_source 2 mpi::comm_world")
        .unwrap();
    let out = sh.eval_script(&format!("mpi::wait {req} st")).unwrap();
    assert_eq!(out, "4 5");
    assert_eq!(sh.interp().get_var("st(COUNT_INT)"), Some("2"));
}

#[test]
fn irecv_before_send_defers_to_wait() {
    let mut sh = initialized_shell();
    // Nothing pending, so the receive is deferred.
    let req = sh
        .eval_script("mpi::irecv mpi::double 0 4 mpi::comm_world")
        .unwrap();
    sh.eval_script("mpi::send {0.5 1.5} mpi::double 0 4 mpi::comm_world")
        .unwrap();
    let out = sh.eval_script(&format!("mpi::wait {req}")).unwrap();
    assert_eq!(out, "0.5 1.5");
}

#[test]
fn wait_on_unknown_request_is_a_noop() {
    let mut sh = initialized_shell();
    assert_eq!(sh.eval_script("mpi::wait mpi::req99").unwrap(), "");
    assert_eq!(sh.eval_script("mpi::wait bogus").unwrap(), "");
}

#[test]
fn request_labels_are_never_reused() {
    let mut sh = initialized_shell();
    let a = sh
        .eval_script("mpi::isend 1 mpi::int 0 0 mpi::comm_world")
        .unwrap();
    sh.eval_script(&format!("mpi::wait {a}")).unwrap();
    let b = sh
        .eval_script("mpi::isend 2 mpi::int 0 0 mpi::comm_world")
        .unwrap();
    assert_ne!(a, b);
    assert_eq!(b, "mpi::req1");
}

#[test]
fn probe_and_iprobe_report_without_consuming() {
    let mut sh = initialized_shell();
    assert_eq!(
        sh.eval_script("mpi::iprobe mpi::any_source mpi::any_tag mpi::comm_world")
            .unwrap(),
        "0"
    );
    sh.eval_script("mpi::send {1 2} mpi::int 0 6 mpi::comm_world")
        .unwrap();
    assert_eq!(
        sh.eval_script("mpi::iprobe 0 6 mpi::comm_world st").unwrap(),
        "1"
    );
    assert_eq!(sh.interp().get_var("st(MPI_TAG)"), Some("6"));
    assert_eq!(sh.interp().get_var("st(COUNT_INT)"), Some("2"));

    sh.eval_script("mpi::probe 0 6 mpi::comm_world st2").unwrap();
    assert_eq!(sh.interp().get_var("st2(MPI_TAG)"), Some("6"));

    // Still deliverable after both probes.
    assert_eq!(
        sh.eval_script("mpi::recv mpi::int 0 6 mpi::comm_world")
            .unwrap(),
        "1 2"
    );
}

#[test]
fn bcast_returns_root_data_everywhere() {
    let mut sh = initialized_shell();
    assert_eq!(
        sh.eval_script("mpi::bcast {10 20 30} mpi::int 0 mpi::comm_world")
            .unwrap(),
        "10 20 30"
    );
    assert_eq!(
        sh.eval_script("mpi::bcast {some text} mpi::auto 0 mpi::comm_world")
            .unwrap(),
        "some text"
    );
}

#[test]
fn scatter_and_gather_round_trip_one_rank() {
    let mut sh = initialized_shell();
    assert_eq!(
        sh.eval_script("mpi::scatter {1 2 3} mpi::int 0 mpi::comm_world")
            .unwrap(),
        "1 2 3"
    );
    assert_eq!(
        sh.eval_script("mpi::gather {1.0 2.0} mpi::double 0 mpi::comm_world")
            .unwrap(),
        "1.0 2.0"
    );
}

#[test]
fn scatter_rejects_auto_data() {
    let mut sh = initialized_shell();
    let err = sh
        .eval_script("mpi::scatter {a b} mpi::auto 0 mpi::comm_world")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "mpi::scatter: does not support data type mpi::auto"
    );
}

#[test]
fn allreduce_and_reduce_are_identities_on_one_rank() {
    let mut sh = initialized_shell();
    assert_eq!(
        sh.eval_script("mpi::allreduce {1 2 3} mpi::int mpi::sum mpi::comm_world")
            .unwrap(),
        "1 2 3"
    );
    assert_eq!(
        sh.eval_script("mpi::reduce {2.5 0.5} mpi::double mpi::max 0 mpi::comm_world")
            .unwrap(),
        "2.5 0.5"
    );
}

#[test]
fn location_reductions_require_pair_types() {
    let mut sh = initialized_shell();
    assert_eq!(
        sh.eval_script("mpi::allreduce {5 0 3 1} mpi::intint mpi::maxloc mpi::comm_world")
            .unwrap(),
        "5 0 3 1"
    );

    let err = sh
        .eval_script("mpi::allreduce {1 2} mpi::int mpi::maxloc mpi::comm_world")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "mpi::allreduce: does not support data type mpi::int"
    );

    let err = sh
        .eval_script("mpi::allreduce {1 2} mpi::intint mpi::sum mpi::comm_world")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "mpi::allreduce: does not support data type mpi::intint"
    );

    let err = sh
        .eval_script("mpi::allreduce {1 2} mpi::auto mpi::sum mpi::comm_world")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "mpi::allreduce: does not support data type mpi::auto"
    );
}

#[test]
fn intint_is_restricted_to_reductions() {
    let mut sh = initialized_shell();
    let err = sh
        .eval_script("mpi::bcast {1 2} mpi::intint 0 mpi::comm_world")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "mpi::bcast: support for data type mpi::intint is not yet implemented."
    );
    let err = sh
        .eval_script("mpi::send {1 2} mpi::intint 0 0 mpi::comm_world")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "mpi::send: support for data type mpi::intint is not yet implemented."
    );
    let err = sh
        .eval_script("mpi::recv mpi::intint 0 0 mpi::comm_world")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "mpi::recv: support for data type mpi::intint is not yet implemented."
    );
    // Pair data is still accepted where pairs mean something.
    assert_eq!(
        sh.eval_script("mpi::allreduce {5 0 3 1} mpi::intint mpi::maxloc mpi::comm_world")
            .unwrap(),
        "5 0 3 1"
    );
}

#[test]
fn dblint_transfers_are_not_implemented() {
    let mut sh = initialized_shell();
    let err = sh
        .eval_script("mpi::allreduce {1.0 0} mpi::dblint mpi::minloc mpi::comm_world")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "mpi::allreduce: support for data type mpi::dblint is not yet implemented."
    );
    let err = sh
        .eval_script("mpi::recv mpi::dblint 0 0 mpi::comm_world")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "mpi::recv: support for data type mpi::dblint is not yet implemented."
    );
}

#[test]
fn invalid_type_strings_are_rejected() {
    let mut sh = initialized_shell();
    let err = sh
        .eval_script("mpi::bcast 1 mpi::float 0 mpi::comm_world")
        .unwrap_err();
    assert_eq!(err.to_string(), "mpi::bcast: invalid data type: mpi::float");
}

#[test]
fn barrier_completes_on_one_rank() {
    let mut sh = initialized_shell();
    assert_eq!(sh.eval_script("mpi::barrier mpi::comm_world").unwrap(), "");
}

#[test]
fn scripted_flow_with_substitution() {
    let mut sh = initialized_shell();
    let script = "\
set comm mpi::comm_world
set rank [mpi::comm_rank $comm]
mpi::send \"rank $rank says hi\" mpi::auto 0 0 $comm
set msg [mpi::recv mpi::auto mpi::any_source mpi::any_tag $comm]
set msg
";
    assert_eq!(sh.eval_script(script).unwrap(), "rank 0 says hi");
}
