use trieplex::*;

fn options(max_mismatches: usize, duplicates: DuplicateAction) -> SingleMatchOptions {
    SingleMatchOptions {
        max_mismatches,
        duplicates,
        ..SingleMatchOptions::default()
    }
}

#[test]
fn one_mismatch_pool_lookup() {
    let pool = BarcodePool::new(["AACC", "AACG", "GGTT"]).unwrap();
    let trie = MismatchTrie::from_pool(&pool, DuplicateAction::Error, AmbiguityPolicy::Reject).unwrap();

    let cases: [(&[u8], MatchStatus, usize); 4] = [
        (b"AACC", MatchStatus::Matched(0), 0),
        (b"AACT", MatchStatus::Ambiguous, 1),
        (b"GGTA", MatchStatus::Matched(2), 1),
        (b"TTTT", MatchStatus::Unmatched, 2),
    ];

    for (query, status, mismatches) in cases {
        assert_eq!(trie.search(query, 1), TrieHit { status, mismatches });
    }
}

#[test]
fn duplicate_policies_through_the_matcher() {
    let pool = BarcodePool::new(["AAAA", "CCCC", "AAAA"]).unwrap();
    let template = || ScanTemplate::parse(b"GT----AC", SearchStrand::Forward).unwrap();

    let err = SimpleSingleMatch::new(template(), &pool, options(0, DuplicateAction::Error)).unwrap_err();
    assert!(matches!(err, Error::DuplicateSequence { first: 0, second: 2, .. }));

    let m = SimpleSingleMatch::new(template(), &pool, options(0, DuplicateAction::UseFirst)).unwrap();
    let mut state = m.initialize();
    assert!(m.search_best(b"GTAAAAAC", &mut state));
    assert_eq!(state.status, MatchStatus::Matched(0));

    let m = SimpleSingleMatch::new(template(), &pool, options(1, DuplicateAction::Discard)).unwrap();
    let mut state = m.initialize();
    assert!(!m.search_best(b"GTAAAAAC", &mut state));
    assert_eq!(state.status, MatchStatus::Unmatched);
    assert!(m.search_best(b"GTCCCCAC", &mut state));
    assert_eq!(state.status, MatchStatus::Matched(1));

    let m = SimpleSingleMatch::new(template(), &pool, options(0, DuplicateAction::UseLast)).unwrap();
    let mut state = m.initialize();
    assert!(m.search_best(b"GTAAAAAC", &mut state));
    assert_eq!(state.status, MatchStatus::Matched(2));
}

#[test]
fn discarded_barcodes_shadow_their_neighbours() {
    let pool = BarcodePool::new(["AAAA", "AAAA", "AAAT"]).unwrap();
    let template = ScanTemplate::parse(b"GT----AC", SearchStrand::Forward).unwrap();
    let m = SimpleSingleMatch::new(template, &pool, options(1, DuplicateAction::Discard)).unwrap();
    let mut state = m.initialize();

    assert!(!m.search_best(b"GTAAAAAC", &mut state));
    assert_eq!(state.status, MatchStatus::Unmatched);
    assert!(!m.search_first(b"GTAAACAC", &mut state));

    assert!(m.search_best(b"GTAAATAC", &mut state));
    assert_eq!((state.status, state.mismatches), (MatchStatus::Matched(2), 0));
}

#[test]
fn case_and_ns_in_reads() {
    let pool = BarcodePool::new(["ACGTAC", "TTGCAA", "GGCATC"]).unwrap();
    let template = ScanTemplate::parse(b"CAG------TGA", SearchStrand::Both).unwrap();
    let m = SimpleSingleMatch::new(template, &pool, options(2, DuplicateAction::Error)).unwrap();
    let mut state = m.initialize();

    assert!(m.search_best(b"nncagttgcaatganntt", &mut state));
    assert_eq!((state.status, state.position, state.mismatches), (MatchStatus::Matched(1), 2, 0));

    assert!(m.search_best(b"CAGTTNCAATGA", &mut state));
    assert_eq!((state.status, state.mismatches, state.variable_mismatches), (MatchStatus::Matched(1), 1, 1));

    assert!(m.search_best(b"CAGTNNCAATGA", &mut state));
    assert_eq!((state.status, state.mismatches), (MatchStatus::Matched(1), 2));

    // one more in a constant region is over the budget
    assert!(!m.search_best(b"CAGTNNCAATGN", &mut state));
}

#[test]
fn reverse_strand_reads() {
    let pool = BarcodePool::new(["ACGTAC", "TTGCAA", "GGCATC"]).unwrap();
    let template = ScanTemplate::parse(b"CAG------TGA", SearchStrand::Both).unwrap();
    let m = SimpleSingleMatch::new(template, &pool, options(1, DuplicateAction::Error)).unwrap();
    let mut state = m.initialize();

    // reverse complement of CAG-GGCATC-TGA with some flanking sequence
    let read = alphabet::reverse_complement(b"ttCAGGGCATCTGAtt");
    assert!(m.search_best(&read, &mut state));
    assert_eq!((state.status, state.strand, state.position), (MatchStatus::Matched(2), Strand::Reverse, 2));
    assert_eq!(&read[state.regions[0].clone()], b"GATGCC");
}

#[test]
fn config_to_counts() {
    let barcodes = "# guide\tsequence\ng1\tACGTAC\ng2\tTTGCAA\ng3\tGGCATC\n";
    let pool = BarcodePool::from_delimited(barcodes.as_bytes(), b'\t', 1).unwrap();
    let config = MatchConfig::from_yaml_str("template: CAG------TGA\nstrand: both\nmax_mismatches: 1\n").unwrap();
    let matcher = config.build(&pool).unwrap();

    let reads: [&[u8]; 6] = [
        b"CAGACGTACTGA",
        b"ttCAGACGTTCTGA",
        b"CAGTTGCAATGAcc",
        b"TCAGATGCCCTG",
        b"CAGGGCATCTGAgg",
        b"nothing to see",
    ];

    let mut counts = vec![0; pool.len()];
    let mut unmatched = 0;
    let mut state = matcher.initialize();

    for read in reads {
        if matcher.search(read, &mut state) {
            counts[state.status().index().unwrap()] += 1;
        } else {
            unmatched += 1;
        }
    }

    assert_eq!(counts, vec![2, 1, 2]);
    assert_eq!(unmatched, 1);
}

#[test]
fn workers_share_one_matcher() {
    let pool = BarcodePool::new(["ACGTAC", "TTGCAA", "GGCATC", "CTCTCT"]).unwrap();
    let template = ScanTemplate::parse(b"CAG------TGA", SearchStrand::Both).unwrap();
    let mut m = SimpleSingleMatch::new(template, &pool, options(2, DuplicateAction::Error)).unwrap();

    let reads: Vec<Vec<u8>> = (0..400)
        .map(|i| {
            let barcode = pool.get(i % pool.len()).unwrap();
            let mut read = b"nnCAG".to_vec();
            read.extend_from_slice(barcode);
            read.extend_from_slice(b"TGAnn");
            if i % 3 == 0 {
                read[6] = b'N';
            }
            if i % 2 == 0 {
                read = alphabet::reverse_complement(&read);
            }
            read
        })
        .collect();

    let expected: Vec<_> = {
        let mut state = m.initialize();
        reads
            .iter()
            .map(|r| {
                m.search_best(r, &mut state);
                (state.status, state.strand, state.mismatches)
            })
            .collect()
    };

    let states = ThreadStates::new();
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = reads
            .chunks(50)
            .map(|chunk| {
                let (m, states) = (&m, &states);
                scope.spawn(move || {
                    states.with(
                        || m.initialize(),
                        |state| {
                            chunk
                                .iter()
                                .map(|r| {
                                    m.search_best(r, state);
                                    (state.status, state.strand, state.mismatches)
                                })
                                .collect::<Vec<_>>()
                        },
                    )
                })
            })
            .collect();

        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results, expected);
    assert!(expected.iter().all(|(status, _, _)| status.is_matched()));

    m.reduce_all(states);
    let mut state = m.initialize();
    assert!(m.search_best(&reads[3], &mut state));
}
