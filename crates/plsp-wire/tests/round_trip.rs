use chrono::{NaiveDate, NaiveTime};
use plsp_wire::message::ResultReply;
use plsp_wire::{
    CursorHandle, Datum, DbType, Decimal, Oid, Packer, ParamMode, Unpacker, Value,
};

fn round_trip(v: &Value) -> Value {
    let mut p = Packer::new();
    // Odd leading byte so every payload starts misaligned.
    p.pack_u8(0xAB);
    v.pack(&mut p).unwrap();
    let mut u = Unpacker::new(p.as_slice());
    assert_eq!(u.unpack_u8().unwrap(), 0xAB);
    let out = Value::unpack(&mut u).unwrap();
    assert!(u.is_empty(), "trailing bytes after {v:?}");
    out
}

fn sample_data() -> Vec<Datum> {
    let date = NaiveDate::from_ymd_opt(1999, 12, 31).unwrap();
    let time = NaiveTime::from_hms_milli_opt(23, 59, 58, 0).unwrap();
    vec![
        Datum::Null,
        Datum::Short(i16::MIN),
        Datum::Short(i16::MAX),
        Datum::Int(i32::MIN),
        Datum::Int(i32::MAX),
        Datum::Bigint(i64::MIN),
        Datum::Bigint(i64::MAX),
        Datum::Float(f32::MAX),
        Datum::Float(-0.0),
        Datum::Double(f64::MIN_POSITIVE),
        Datum::Double(f64::MAX),
        Datum::Numeric("-12345678901234567890.000001".parse::<Decimal>().unwrap()),
        Datum::String(String::new()),
        Datum::String("h\u{e9}llo".to_string()),
        Datum::Date(date),
        Datum::Time(time),
        Datum::Timestamp(date.and_time(time)),
        Datum::Datetime(date.and_hms_milli_opt(1, 2, 3, 999).unwrap()),
        Datum::Oid(Oid {
            page: 1024,
            slot: -1,
            volume: 3,
        }),
        Datum::ResultSet(CursorHandle(i64::MAX)),
        Datum::Collection(vec![]),
        Datum::Collection(vec![
            Value::of(Datum::Int(1)),
            Value::of(Datum::Collection(vec![Value::of(Datum::String("x".into()))])),
            Value::null(DbType::Date),
        ]),
    ]
}

#[test]
fn every_kind_round_trips_under_every_db_type() {
    for datum in sample_data() {
        for db_type in DbType::ALL {
            for mode in [ParamMode::In, ParamMode::Out, ParamMode::InOut] {
                let v = Value::new(datum.clone(), db_type).with_mode(mode);
                assert_eq!(round_trip(&v), v);
            }
        }
    }
}

#[test]
fn scalar_offsets_are_naturally_aligned() {
    let mut p = Packer::new();
    for (i, datum) in sample_data().into_iter().enumerate() {
        for _ in 0..(i % 7) {
            p.pack_u8(0);
        }
        let before = p.len();
        match datum {
            Datum::Short(v) => {
                p.pack_i16(v);
                assert_eq!((p.len() - 2) % 2, 0);
            }
            Datum::Int(v) => {
                p.pack_i32(v);
                assert_eq!((p.len() - 4) % 4, 0);
            }
            Datum::Bigint(v) => {
                p.pack_i64(v);
                assert_eq!((p.len() - 8) % 8, 0);
            }
            Datum::Float(v) => {
                p.pack_f32(v);
                assert_eq!((p.len() - 4) % 4, 0);
            }
            Datum::Double(v) => {
                p.pack_f64(v);
                assert_eq!((p.len() - 8) % 8, 0);
            }
            _ => {}
        }
        assert!(p.len() >= before);
    }
}

#[test]
fn strings_of_boundary_lengths_round_trip() {
    for len in [0usize, 254, 255, 100_000] {
        let s: String = "abcdefghij".chars().cycle().take(len).collect();
        let mut p = Packer::new();
        p.pack_string(&s).unwrap();
        if len >= 255 {
            assert_eq!(p.as_slice()[0], 0xFF);
            assert_eq!(&p.as_slice()[4..8], &(len as i32).to_be_bytes());
        } else {
            assert_eq!(usize::from(p.as_slice()[0]), len);
        }
        assert_eq!(p.len() % 4, 0);
        let mut u = Unpacker::new(p.as_slice());
        assert_eq!(u.unpack_string().unwrap(), s);
        assert!(u.is_empty());
    }
}

#[test]
fn result_reply_streams_out_params_after_the_result() {
    let reply = ResultReply {
        value: Value::of(Datum::Bigint(10)),
        out_params: vec![
            Value::of(Datum::Int(1)).with_mode(ParamMode::Out),
            Value::null(DbType::String).with_mode(ParamMode::InOut),
        ],
    };
    let mut p = Packer::new();
    reply.pack(&mut p).unwrap();
    let mut u = Unpacker::new(p.as_slice());
    assert_eq!(ResultReply::unpack(&mut u).unwrap(), reply);
}

#[test]
fn reading_past_the_buffer_is_fatal() {
    let mut p = Packer::new();
    Value::of(Datum::Bigint(5)).pack(&mut p).unwrap();
    let bytes = &p.as_slice()[..p.len() - 3];
    let err = Value::unpack(&mut Unpacker::new(bytes)).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn deeply_nested_invoke_arguments_are_malformed_not_a_crash() {
    use plsp_wire::message::InvokeRequest;
    use plsp_wire::WireError;

    let mut p = Packer::new();
    p.pack_string("'m'.f(i32[])").unwrap();
    p.pack_i32(1);
    for _ in 0..200_000 {
        p.pack_i32(ParamMode::In.code());
        p.pack_i32(DbType::Sequence.tag());
        p.pack_i32(DbType::Sequence.tag());
        p.pack_i32(1);
    }
    let err = InvokeRequest::unpack(&mut Unpacker::new(p.as_slice())).unwrap_err();
    assert!(matches!(err, WireError::Malformed(_)), "{err:?}");
    assert!(!err.is_fatal());
}

#[test]
fn marshaled_times_survive_the_wire() {
    let t = NaiveTime::from_hms_nano_opt(23, 59, 58, 999_999_999).unwrap();
    let v = plsp_wire::marshal::to_db_type(DbType::Time, &Value::of(Datum::Time(t))).unwrap();
    assert_eq!(v.datum, Datum::Time(NaiveTime::from_hms_opt(23, 59, 58).unwrap()));
    assert_eq!(round_trip(&v), v);
}
